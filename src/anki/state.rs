use std::collections::HashMap;

use super::config::AnkiConfig;
use crate::core::AnkiError;

/// Raw facts mirrored from the peer by the last successful refresh.
///
/// `model_fields` is populated lazily: only models the client has had a
/// reason to inspect are present (currently just the configured note type),
/// which keeps a refresh at a fixed number of requests no matter how many
/// models live in the collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnkiState {
    pub version: u32,
    pub deck_names: Vec<String>,
    pub model_names: Vec<String>,
    pub model_fields: HashMap<String, Vec<String>>,
}

/// One published view of the mirror: raw facts plus readiness flags derived
/// against the configuration that was current when it was produced.
///
/// A snapshot is either fully derived from fresh facts or an error snapshot
/// with every flag zeroed and no facts at all; it is never partially filled,
/// and never mutated after publication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub state: AnkiState,
    pub last_error: Option<AnkiError>,
    pub current_fields: Vec<String>,
    pub deck_exists: bool,
    pub note_type_exists: bool,
    pub note_has_all_fields: bool,
    pub order_defined: bool,
}

impl Snapshot {
    /// Derives all readiness flags from `(config, state)`. Pure: same inputs,
    /// same snapshot.
    pub fn derive(config: &AnkiConfig, state: AnkiState) -> Self {
        let deck_exists = state.deck_names.iter().any(|name| name == config.deck());
        let note_type_exists = state.model_names.iter().any(|name| name == config.note_type());

        let current_fields =
            state.model_fields.get(config.note_type()).cloned().unwrap_or_default();

        let note_has_all_fields = !current_fields.is_empty()
            && config.fields().keys().all(|field| current_fields.contains(field));

        // Anki renders the first field positionally (it is the dedupe key and
        // the browser column), so a mapping that skips it is its own, milder
        // misconfiguration than missing fields in general.
        let order_defined = current_fields
            .first()
            .map(|first| config.fields().contains_key(first))
            .unwrap_or(false);

        Self {
            state,
            last_error: None,
            current_fields,
            deck_exists,
            note_type_exists,
            note_has_all_fields,
            order_defined,
        }
    }

    /// An error snapshot carries no raw facts at all, so stale partial data
    /// can never be mistaken for current.
    pub fn errored(error: AnkiError) -> Self {
        Self { last_error: Some(error), ..Self::default() }
    }

    /// The single gate every mutating command consults before contacting the
    /// peer.
    pub fn is_ready_to_add_note(&self) -> bool {
        self.last_error.is_none()
            && self.deck_exists
            && self.note_type_exists
            && self.note_has_all_fields
            && self.order_defined
    }
}
