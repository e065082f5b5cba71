use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
};

use serde::{
    Deserialize,
    Serialize,
};
use tracing::info;

use crate::{
    anki::{
        config::{
            AnkiConfig,
            FieldTemplate,
        },
        validate,
        AnkiClient,
    },
    core::AnkiError,
    persistence,
};

const SETTINGS_FILE: &str = "anki_settings.json";

fn default_address() -> String {
    "http://127.0.0.1:8765".to_string()
}

/// The slice of the application settings the sync client cares about.
/// Field templates are stored as source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnkiSettings {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub deck: String,
    #[serde(default)]
    pub note_type: String,
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

impl Default for AnkiSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            api_key: None,
            deck: String::new(),
            note_type: String::new(),
            fields: HashMap::new(),
        }
    }
}

impl AnkiSettings {
    pub fn to_anki_config(&self) -> AnkiConfig {
        let fields = self
            .fields
            .iter()
            .map(|(name, source)| (name.clone(), FieldTemplate::new(source.clone())))
            .collect();
        AnkiConfig::new(
            self.address.clone(),
            self.api_key.clone(),
            self.deck.clone(),
            self.note_type.clone(),
            fields,
        )
    }
}

/// Boundary to the application's settings manager: commit a mutation, get
/// the settings as committed back.
pub trait SettingsStore: Send + Sync {
    fn update_settings(
        &self,
        mutate: &mut dyn FnMut(&mut AnkiSettings),
    ) -> Result<AnkiSettings, Box<dyn std::error::Error>>;

    fn settings(&self) -> AnkiSettings;
}

/// File-backed store over the app data dir; every committed update is
/// persisted immediately.
pub struct JsonSettingsStore {
    current: Mutex<AnkiSettings>,
}

impl JsonSettingsStore {
    pub fn load() -> Self {
        Self { current: Mutex::new(persistence::load_json_or_default(SETTINGS_FILE)) }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn update_settings(
        &self,
        mutate: &mut dyn FnMut(&mut AnkiSettings),
    ) -> Result<AnkiSettings, Box<dyn std::error::Error>> {
        let mut current = self.current.lock().unwrap();
        let mut updated = current.clone();
        mutate(&mut updated);
        persistence::save_json(&updated, SETTINGS_FILE)?;
        *current = updated.clone();
        Ok(updated)
    }

    fn settings(&self) -> AnkiSettings {
        self.current.lock().unwrap().clone()
    }
}

/// Bridges user-facing settings edits to the sync client: validate, commit
/// through the store, and reload the client only when the derived
/// configuration actually changed (structural equality, template sources
/// included).
pub struct ConfigAdapter {
    store: Arc<dyn SettingsStore>,
    client: Arc<AnkiClient>,
}

impl ConfigAdapter {
    pub fn new(store: Arc<dyn SettingsStore>, client: Arc<AnkiClient>) -> Self {
        Self { store, client }
    }

    pub async fn set_connection(
        &self,
        address: &str,
        api_key: Option<String>,
    ) -> Result<(), AnkiError> {
        if address.trim().is_empty() {
            return Err(AnkiError::Validation("address must not be empty".to_string()));
        }
        self.commit(&mut |settings: &mut AnkiSettings| {
            settings.address = address.to_string();
            settings.api_key = api_key.clone();
        })
        .await
    }

    pub async fn set_deck(&self, deck: &str) -> Result<(), AnkiError> {
        validate::deck_name(deck)?;
        self.commit(&mut |settings: &mut AnkiSettings| settings.deck = deck.to_string()).await
    }

    pub async fn set_note_type(&self, note_type: &str) -> Result<(), AnkiError> {
        validate::note_type_name(note_type)?;
        self.commit(&mut |settings: &mut AnkiSettings| settings.note_type = note_type.to_string())
            .await
    }

    pub async fn set_field_template(&self, field: &str, source: &str) -> Result<(), AnkiError> {
        validate::field_name(field)?;
        self.commit(&mut |settings: &mut AnkiSettings| {
            settings.fields.insert(field.to_string(), source.to_string());
        })
        .await
    }

    pub async fn remove_field(&self, field: &str) -> Result<(), AnkiError> {
        self.commit(&mut |settings: &mut AnkiSettings| {
            settings.fields.remove(field);
        })
        .await
    }

    async fn commit(
        &self,
        mutate: &mut dyn FnMut(&mut AnkiSettings),
    ) -> Result<(), AnkiError> {
        let updated = self
            .store
            .update_settings(mutate)
            .map_err(|e| AnkiError::Config(e.to_string()))?;

        let new_config = updated.to_anki_config();
        if new_config != self.client.config().await {
            info!("anki settings changed, reloading client");
            self.client.reload_config(new_config).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{
        AtomicUsize,
        Ordering,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        anki::{
            config::Endpoint,
            connect::{
                AnkiConnect,
                CreateModelParams,
                NoteParams,
                Permission,
            },
        },
        core::ConnectError,
    };

    #[derive(Default)]
    struct StubAnki {
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl AnkiConnect for StubAnki {
        async fn request_permission(&self, _: &Endpoint) -> Result<Permission, ConnectError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(Permission { granted: true, api_key_required: false, version: 6 })
        }
        async fn deck_names(&self, _: &Endpoint) -> Result<Vec<String>, ConnectError> {
            Ok(vec!["Default".to_string()])
        }
        async fn model_names(&self, _: &Endpoint) -> Result<Vec<String>, ConnectError> {
            Ok(vec![])
        }
        async fn model_field_names(
            &self,
            _: &Endpoint,
            model: &str,
        ) -> Result<Vec<String>, ConnectError> {
            Err(ConnectError::Api(format!("model was not found: {}", model)))
        }
        async fn create_deck(&self, _: &Endpoint, _: &str) -> Result<u64, ConnectError> {
            Ok(1)
        }
        async fn create_model(
            &self,
            _: &Endpoint,
            _: &CreateModelParams,
        ) -> Result<u64, ConnectError> {
            Ok(1)
        }
        async fn add_note(&self, _: &Endpoint, _: &NoteParams) -> Result<u64, ConnectError> {
            Ok(1)
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        current: Mutex<AnkiSettings>,
        commits: AtomicUsize,
    }

    impl SettingsStore for MemoryStore {
        fn update_settings(
            &self,
            mutate: &mut dyn FnMut(&mut AnkiSettings),
        ) -> Result<AnkiSettings, Box<dyn std::error::Error>> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            let mut current = self.current.lock().unwrap();
            mutate(&mut current);
            Ok(current.clone())
        }

        fn settings(&self) -> AnkiSettings {
            self.current.lock().unwrap().clone()
        }
    }

    async fn adapter() -> (Arc<MemoryStore>, Arc<StubAnki>, Arc<AnkiClient>, ConfigAdapter) {
        let store = Arc::new(MemoryStore::default());
        let stub = Arc::new(StubAnki::default());
        let client = Arc::new(
            AnkiClient::connect(store.settings().to_anki_config(), stub.clone()).await,
        );
        let adapter = ConfigAdapter::new(store.clone(), client.clone());
        (store, stub, client, adapter)
    }

    #[tokio::test]
    async fn edits_flow_through_store_and_client() {
        let (store, _stub, client, adapter) = adapter().await;

        adapter.set_deck("Mining").await.unwrap();
        adapter.set_field_template("Word", "{{.Word}}").await.unwrap();

        assert_eq!(store.settings().deck, "Mining");
        let config = client.config().await;
        assert_eq!(config.deck(), "Mining");
        assert_eq!(config.fields().get("Word").map(|t| t.source()), Some("{{.Word}}"));

        client.stop().await;
    }

    #[tokio::test]
    async fn invalid_edits_never_reach_the_store() {
        let (store, _stub, client, adapter) = adapter().await;

        assert!(matches!(adapter.set_deck("  a").await, Err(AnkiError::Validation(_))));
        assert!(matches!(
            adapter.set_field_template("a:b", "{{.A}}").await,
            Err(AnkiError::Validation(_))
        ));
        assert!(matches!(adapter.set_connection("", None).await, Err(AnkiError::Validation(_))));
        assert_eq!(store.commits.load(Ordering::SeqCst), 0);

        client.stop().await;
    }

    #[tokio::test]
    async fn unchanged_settings_do_not_reload() {
        let (store, stub, client, adapter) = adapter().await;

        let refreshes_after_connect = stub.refreshes.load(Ordering::SeqCst);

        // Removing a field that is not mapped commits but changes nothing,
        // so no reload (and no refresh) happens.
        adapter.remove_field("Nope").await.unwrap();
        assert_eq!(store.commits.load(Ordering::SeqCst), 1);
        assert_eq!(stub.refreshes.load(Ordering::SeqCst), refreshes_after_connect);

        client.stop().await;
    }

    #[test]
    fn settings_round_trip_to_config() {
        let mut settings = AnkiSettings::default();
        settings.deck = "Mining".to_string();
        settings.note_type = "Vocab".to_string();
        settings.fields.insert("Word".to_string(), "{{.Word}}".to_string());

        let config = settings.to_anki_config();
        assert_eq!(config.address(), "http://127.0.0.1:8765");
        assert_eq!(config.deck(), "Mining");
        assert_eq!(config.note_type(), "Vocab");
        assert_eq!(config.fields().len(), 1);
    }
}
