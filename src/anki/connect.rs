use std::{
    collections::HashMap,
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Client;
use serde::{
    de::DeserializeOwned,
    Deserialize,
    Serialize,
};

use super::config::Endpoint;
use crate::core::ConnectError;

pub const ANKI_CONNECT_VERSION: u32 = 6;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome of a `requestPermission` round-trip. Denied permission is a
/// successful transport exchange, the caller decides what it means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub granted: bool,
    pub api_key_required: bool,
    pub version: u32,
}

#[derive(Debug, Deserialize)]
struct PermissionResponse {
    permission: String,
    #[serde(default, rename = "requireApikey")]
    require_api_key: bool,
    #[serde(default)]
    version: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardTemplate {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Front")]
    pub front: String,
    #[serde(rename = "Back")]
    pub back: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateModelParams {
    pub model_name: String,
    pub in_order_fields: Vec<String>,
    pub css: String,
    pub is_cloze: bool,
    pub card_templates: Vec<CardTemplate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteOptions {
    pub allow_duplicate: bool,
    pub duplicate_scope: String,
}

impl Default for NoteOptions {
    fn default() -> Self {
        Self { allow_duplicate: false, duplicate_scope: "deck".to_string() }
    }
}

/// The `addNote` wire shape. Tags and media assets ride along untouched;
/// interpreting them is an extension point, not this layer's business.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteParams {
    pub deck_name: String,
    pub model_name: String,
    pub fields: HashMap<String, String>,
    pub options: NoteOptions,
    pub tags: Vec<String>,
}

/// The narrow capability set the sync client needs from anki-connect.
///
/// Every call takes the target endpoint explicitly; the capability itself
/// holds no connection state, so a configuration swap retargets it
/// wholesale. Test doubles implement this to count and script calls.
#[async_trait]
pub trait AnkiConnect: Send + Sync {
    async fn request_permission(&self, target: &Endpoint) -> Result<Permission, ConnectError>;
    async fn deck_names(&self, target: &Endpoint) -> Result<Vec<String>, ConnectError>;
    async fn model_names(&self, target: &Endpoint) -> Result<Vec<String>, ConnectError>;
    async fn model_field_names(
        &self,
        target: &Endpoint,
        model: &str,
    ) -> Result<Vec<String>, ConnectError>;
    async fn create_deck(&self, target: &Endpoint, name: &str) -> Result<u64, ConnectError>;
    async fn create_model(
        &self,
        target: &Endpoint,
        params: &CreateModelParams,
    ) -> Result<u64, ConnectError>;
    async fn add_note(&self, target: &Endpoint, note: &NoteParams) -> Result<u64, ConnectError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    result: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, ConnectError> {
        if let Some(error) = self.error {
            return Err(ConnectError::Api(error));
        }
        self.result
            .ok_or_else(|| ConnectError::Api("response carried neither result nor error".to_string()))
    }
}

/// Production transport: anki-connect's single-endpoint JSON protocol, a
/// `{action, version, key?, params?}` body posted to the configured address.
pub struct HttpAnkiConnect {
    client: Client,
}

impl HttpAnkiConnect {
    pub fn new() -> Result<Self, ConnectError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client })
    }

    async fn invoke<T: DeserializeOwned>(
        &self,
        target: &Endpoint,
        action: &str,
        params: Option<serde_json::Value>,
    ) -> Result<T, ConnectError> {
        let mut body = serde_json::Map::new();
        body.insert("action".to_string(), serde_json::Value::String(action.to_string()));
        body.insert("version".to_string(), serde_json::Value::Number(ANKI_CONNECT_VERSION.into()));
        if let Some(key) = &target.api_key {
            body.insert("key".to_string(), serde_json::Value::String(key.clone()));
        }
        if let Some(params) = params {
            body.insert("params".to_string(), params);
        }

        let response: ApiResponse<T> = self
            .client
            .post(&target.address)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        response.into_result()
    }
}

#[async_trait]
impl AnkiConnect for HttpAnkiConnect {
    async fn request_permission(&self, target: &Endpoint) -> Result<Permission, ConnectError> {
        let response: PermissionResponse =
            self.invoke(target, "requestPermission", None).await?;
        Ok(Permission {
            granted: response.permission == "granted",
            api_key_required: response.require_api_key,
            version: response.version,
        })
    }

    async fn deck_names(&self, target: &Endpoint) -> Result<Vec<String>, ConnectError> {
        self.invoke(target, "deckNames", None).await
    }

    async fn model_names(&self, target: &Endpoint) -> Result<Vec<String>, ConnectError> {
        self.invoke(target, "modelNames", None).await
    }

    async fn model_field_names(
        &self,
        target: &Endpoint,
        model: &str,
    ) -> Result<Vec<String>, ConnectError> {
        let params = serde_json::json!({ "modelName": model });
        self.invoke(target, "modelFieldNames", Some(params)).await
    }

    async fn create_deck(&self, target: &Endpoint, name: &str) -> Result<u64, ConnectError> {
        let params = serde_json::json!({ "deck": name });
        self.invoke(target, "createDeck", Some(params)).await
    }

    async fn create_model(
        &self,
        target: &Endpoint,
        params: &CreateModelParams,
    ) -> Result<u64, ConnectError> {
        let params = serde_json::to_value(params)
            .map_err(|e| ConnectError::Api(format!("createModel encode failed: {}", e)))?;
        // createModel answers with the full model object; the id is all the
        // caller gets to keep.
        let model: serde_json::Value = self.invoke(target, "createModel", Some(params)).await?;
        Ok(model.get("id").and_then(|id| id.as_u64()).unwrap_or_default())
    }

    async fn add_note(&self, target: &Endpoint, note: &NoteParams) -> Result<u64, ConnectError> {
        let params = serde_json::json!({ "note": note });
        self.invoke(target, "addNote", Some(params)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_template_serializes_with_anki_casing() {
        let template = CardTemplate {
            name: "Card 1".to_string(),
            front: "{{Word}}".to_string(),
            back: "{{FrontSide}}".to_string(),
        };
        let value = serde_json::to_value(&template).unwrap();
        assert_eq!(value["Name"], "Card 1");
        assert_eq!(value["Front"], "{{Word}}");
    }

    #[test]
    fn note_params_serialize_camel_case() {
        let note = NoteParams {
            deck_name: "Mining".to_string(),
            model_name: "Vocab".to_string(),
            fields: HashMap::new(),
            options: NoteOptions::default(),
            tags: vec![],
        };
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["deckName"], "Mining");
        assert_eq!(value["options"]["duplicateScope"], "deck");
        assert_eq!(value["options"]["allowDuplicate"], false);
    }

    #[test]
    fn envelope_error_wins_over_result() {
        let response: ApiResponse<u32> =
            serde_json::from_str(r#"{"result": null, "error": "collection is not available"}"#)
                .unwrap();
        assert!(matches!(response.into_result(), Err(ConnectError::Api(_))));
    }

    #[test]
    fn envelope_result_passes_through() {
        let response: ApiResponse<Vec<String>> =
            serde_json::from_str(r#"{"result": ["Default"], "error": null}"#).unwrap();
        assert_eq!(response.into_result().unwrap(), vec!["Default".to_string()]);
    }
}
