use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use tokio::{
    sync::{
        watch,
        Mutex,
    },
    task::JoinHandle,
    time::sleep,
};
use tracing::{
    debug,
    info,
    warn,
};

use super::{
    config::AnkiConfig,
    connect::{
        AnkiConnect,
        NoteOptions,
        NoteParams,
    },
    default_model,
    state::{
        AnkiState,
        Snapshot,
    },
    validate,
};
use crate::core::{
    errors::{
        MSG_DUPLICATE_NOTE,
        MSG_MODEL_EXISTS,
    },
    AnkiError,
    ConnectError,
};

/// How long the background task sleeps after a clean refresh.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Retry cadence while the last snapshot is an error snapshot. Deliberately
/// a short fixed interval instead of backoff: the usual failure is "the user
/// has not clicked the permission dialog yet", which only a human resolves.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// A field-only note to add to the configured deck and note type. Tags ride
/// along to the wire untouched; media assets are not supported yet.
#[derive(Debug, Clone, Default)]
pub struct Note {
    pub fields: HashMap<String, String>,
    pub tags: Vec<String>,
}

struct ClientState {
    config: AnkiConfig,
    snapshot: Arc<Snapshot>,
}

struct Shared {
    connect: Arc<dyn AnkiConnect>,
    // One lock around "read config+snapshot, maybe call anki, publish".
    // Held across the peer round-trip on purpose: commands from callers and
    // the background task are strictly serialized, never interleaved.
    state: Mutex<ClientState>,
}

/// Live best-effort mirror of one Anki instance.
///
/// Reads are served from the most recently published snapshot; mutating
/// commands talk to anki and reconcile the snapshot before returning. A
/// background task re-derives the full snapshot on a fixed cadence. While
/// the last refresh failed, every operation returns that cached error
/// without touching the network, and the background task alone retries.
pub struct AnkiClient {
    shared: Arc<Shared>,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AnkiClient {
    /// Performs one full refresh before returning, so the first `get_state`
    /// already reflects the peer (or the error reaching it), then starts the
    /// background refresh task.
    pub async fn connect(config: AnkiConfig, remote: Arc<dyn AnkiConnect>) -> Self {
        Self::with_intervals(config, remote, REFRESH_INTERVAL, RETRY_INTERVAL).await
    }

    /// Same as [`AnkiClient::connect`] with a custom refresh cadence.
    pub async fn with_intervals(
        config: AnkiConfig,
        remote: Arc<dyn AnkiConnect>,
        refresh_interval: Duration,
        retry_interval: Duration,
    ) -> Self {
        let snapshot = Arc::new(refresh(remote.as_ref(), &config).await);
        let shared = Arc::new(Shared {
            connect: remote,
            state: Mutex::new(ClientState { config, snapshot }),
        });

        let (stop_tx, stop_rx) = watch::channel(false);
        let task =
            tokio::spawn(background_loop(shared.clone(), stop_rx, refresh_interval, retry_interval));

        Self { shared, stop_tx, task: Mutex::new(Some(task)) }
    }

    /// Current snapshot, or the cached error if the last refresh failed.
    /// Never calls anki.
    pub async fn get_state(&self) -> Result<Arc<Snapshot>, AnkiError> {
        let state = self.shared.state.lock().await;
        match &state.snapshot.last_error {
            Some(error) => Err(error.clone()),
            None => Ok(Arc::clone(&state.snapshot)),
        }
    }

    pub async fn config(&self) -> AnkiConfig {
        self.shared.state.lock().await.config.clone()
    }

    /// Swaps the configuration and refreshes against it before returning,
    /// so a caller that observes the reload sees its effect immediately. A
    /// failing refresh still adopts the new configuration; the failure shows
    /// up as an error snapshot, not as a failed reload.
    pub async fn reload_config(&self, config: AnkiConfig) {
        let mut state = self.shared.state.lock().await;
        info!(deck = config.deck(), note_type = config.note_type(), "anki config reloaded");
        state.config = config;
        state.snapshot = Arc::new(refresh(self.shared.connect.as_ref(), &state.config).await);
    }

    pub async fn create_deck(&self, name: &str) -> Result<(), AnkiError> {
        validate::deck_name(name)?;

        let mut state = self.shared.state.lock().await;
        if let Some(error) = &state.snapshot.last_error {
            return Err(error.clone());
        }
        // Anki's own createDeck is a silent no-op on duplicates; answering
        // from the mirror gives the caller a real signal and skips the
        // round-trip.
        if state.snapshot.state.deck_names.iter().any(|deck| deck == name) {
            return Err(AnkiError::DeckAlreadyExists(name.to_string()));
        }

        let target = state.config.endpoint();
        if let Err(err) = self.shared.connect.create_deck(&target, name).await {
            return Err(fail(&mut state, err.classify()));
        }

        // Re-list instead of patching in the new name; the collection may
        // have been mutated out-of-band since the snapshot was taken.
        match self.shared.connect.deck_names(&target).await {
            Ok(deck_names) => {
                let mut raw = state.snapshot.state.clone();
                raw.deck_names = deck_names;
                state.snapshot = Arc::new(Snapshot::derive(&state.config, raw));
                info!(deck = name, "created anki deck");
                Ok(())
            }
            Err(err) => Err(fail(&mut state, err.classify())),
        }
    }

    /// Creates a note type with the built-in schema from
    /// [`default_model::DEFAULT_FIELDS`].
    pub async fn create_default_note_type(&self, name: &str) -> Result<(), AnkiError> {
        validate::note_type_name(name)?;

        let mut state = self.shared.state.lock().await;
        if let Some(error) = &state.snapshot.last_error {
            return Err(error.clone());
        }

        let target = state.config.endpoint();
        let params = default_model::create_model_params(name);
        if let Err(err) = self.shared.connect.create_model(&target, &params).await {
            // The duplicate answer is an expected outcome, resolve it before
            // generic classification and leave the snapshot alone.
            if is_api_message(&err, MSG_MODEL_EXISTS) {
                return Err(AnkiError::NoteTypeAlreadyExists(name.to_string()));
            }
            return Err(fail(&mut state, err.classify()));
        }

        // The created model may or may not be the configured one; re-derive
        // against fresh model facts either way.
        let model_names = match self.shared.connect.model_names(&target).await {
            Ok(names) => names,
            Err(err) => return Err(fail(&mut state, err.classify())),
        };

        let mut raw = state.snapshot.state.clone();
        raw.model_names = model_names;
        let configured = state.config.note_type().to_string();
        match self.shared.connect.model_field_names(&target, &configured).await {
            Ok(fields) => {
                raw.model_fields.insert(configured, fields);
            }
            Err(err) => {
                let classified = err.classify();
                if !classified.is_not_found() {
                    return Err(fail(&mut state, classified));
                }
                raw.model_fields.remove(&configured);
            }
        }

        state.snapshot = Arc::new(Snapshot::derive(&state.config, raw));
        info!(note_type = name, "created anki note type");
        Ok(())
    }

    /// Adds a note to the configured deck and note type, returning its id.
    /// Requires a snapshot that passes [`Snapshot::is_ready_to_add_note`];
    /// an error-free snapshot can still be unready (deck missing, mapping
    /// incomplete), hence the second gate. Success does not refresh the
    /// snapshot: adding a note changes no existence fact the mirror tracks.
    pub async fn add_note(&self, note: Note) -> Result<u64, AnkiError> {
        let mut state = self.shared.state.lock().await;
        if let Some(error) = &state.snapshot.last_error {
            return Err(error.clone());
        }
        if !state.snapshot.is_ready_to_add_note() {
            return Err(AnkiError::IncompleteConfiguration);
        }

        let target = state.config.endpoint();
        let params = NoteParams {
            deck_name: state.config.deck().to_string(),
            model_name: state.config.note_type().to_string(),
            fields: note.fields,
            options: NoteOptions::default(),
            tags: note.tags,
        };

        match self.shared.connect.add_note(&target, &params).await {
            Ok(id) => {
                debug!(id, "added anki note");
                Ok(id)
            }
            Err(err) => {
                if is_api_message(&err, MSG_DUPLICATE_NOTE) {
                    return Err(AnkiError::DuplicateNote);
                }
                Err(fail(&mut state, err.classify()))
            }
        }
    }

    /// Signals the background task and waits for it to exit. A refresh that
    /// is already in flight completes first; no anki call starts after this
    /// returns. Idempotent.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if handle.await.is_err() {
                warn!("anki refresh task panicked before stop");
            }
        }
    }
}

/// Publishes an error snapshot for a failed peer call and hands the error
/// back for returning. Callers always see the classified error, never a raw
/// transport one.
fn fail(state: &mut ClientState, error: AnkiError) -> AnkiError {
    state.snapshot = Arc::new(Snapshot::errored(error.clone()));
    error
}

fn is_api_message(err: &ConnectError, needle: &str) -> bool {
    matches!(err, ConnectError::Api(msg) if msg.to_lowercase().contains(needle))
}

async fn background_loop(
    shared: Arc<Shared>,
    mut stop_rx: watch::Receiver<bool>,
    refresh_interval: Duration,
    retry_interval: Duration,
) {
    loop {
        let delay = {
            let state = shared.state.lock().await;
            if state.snapshot.last_error.is_some() {
                retry_interval
            } else {
                refresh_interval
            }
        };

        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = sleep(delay) => {}
        }

        let mut state = shared.state.lock().await;
        // A stop signalled while we waited for the lock still wins.
        if *stop_rx.borrow() {
            break;
        }
        state.snapshot = Arc::new(refresh(shared.connect.as_ref(), &state.config).await);
    }
    debug!("anki refresh task stopped");
}

async fn refresh(connect: &dyn AnkiConnect, config: &AnkiConfig) -> Snapshot {
    match fetch_state(connect, config).await {
        Ok(state) => Snapshot::derive(config, state),
        Err(error) => {
            warn!(%error, "anki refresh failed");
            Snapshot::errored(error)
        }
    }
}

/// The full refresh sequence: permission, decks, models, then fields of the
/// configured note type only, which keeps the request count flat no matter
/// how many models exist. Any failure throws away whatever was gathered; an
/// error snapshot never carries partial facts.
async fn fetch_state(
    connect: &dyn AnkiConnect,
    config: &AnkiConfig,
) -> Result<AnkiState, AnkiError> {
    let target = config.endpoint();

    let permission =
        connect.request_permission(&target).await.map_err(ConnectError::classify)?;
    if !permission.granted {
        return Err(AnkiError::ForbiddenOrigin);
    }

    let deck_names = connect.deck_names(&target).await.map_err(ConnectError::classify)?;
    let model_names = connect.model_names(&target).await.map_err(ConnectError::classify)?;

    let mut model_fields = HashMap::new();
    match connect.model_field_names(&target, config.note_type()).await {
        Ok(fields) => {
            model_fields.insert(config.note_type().to_string(), fields);
        }
        Err(err) => {
            let classified = err.classify();
            // A missing model usually means it has not been created yet;
            // that is "no fields known", not a failed refresh.
            if !classified.is_not_found() {
                return Err(classified);
            }
        }
    }

    Ok(AnkiState { version: permission.version, deck_names, model_names, model_fields })
}
