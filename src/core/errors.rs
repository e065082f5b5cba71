use thiserror::Error;

/// Typed taxonomy for everything that can go wrong while talking to Anki.
///
/// Error snapshots hand the last refresh failure back verbatim to every
/// caller until the background task recovers, so the whole enum is `Clone`
/// and comparable; transport errors are stringified for the same reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnkiError {
    #[error("anki did not grant permission to this origin")]
    ForbiddenOrigin,

    #[error("anki collection is not available")]
    CollectionUnavailable,

    #[error("anki server error: {0}")]
    Server(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("deck \"{0}\" already exists")]
    DeckAlreadyExists(String),

    #[error("note type \"{0}\" already exists")]
    NoteTypeAlreadyExists(String),

    #[error("a note with these contents already exists")]
    DuplicateNote,

    #[error("anki configuration is incomplete: check deck, note type and field mapping")]
    IncompleteConfiguration,

    #[error("invalid name: {0}")]
    Validation(String),

    #[error("config error: {0}")]
    Config(String),
}

impl AnkiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AnkiError::NotFound(_))
    }
}

/// What the transport layer reports before classification: either Anki
/// answered with an error string in the response envelope, or the request
/// never completed.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("anki-connect error: {0}")]
    Api(String),

    #[error("http error: {0}")]
    Http(Box<reqwest::Error>),
}

impl From<reqwest::Error> for ConnectError {
    fn from(error: reqwest::Error) -> Self {
        ConnectError::Http(Box::new(error))
    }
}

// Distinguished anki-connect messages. Everything else anki says lands in
// AnkiError::Server with the message preserved.
const MSG_API_KEY_REQUIRED: &str = "valid api key must be provided";
const MSG_COLLECTION_UNAVAILABLE: &str = "collection is not available";
const MSG_NOT_FOUND: &str = "was not found";

pub const MSG_MODEL_EXISTS: &str = "model name already exists";
pub const MSG_DUPLICATE_NOTE: &str = "cannot create note because it is a duplicate";

impl ConnectError {
    /// Collapses a raw peer error into the typed taxonomy. Anki-connect only
    /// speaks in free-text messages, so this is the one place strings are
    /// matched; everything downstream matches on the variant.
    pub fn classify(self) -> AnkiError {
        match self {
            ConnectError::Http(err) => AnkiError::Connection(err.to_string()),
            ConnectError::Api(msg) => {
                let lowered = msg.to_lowercase();
                if lowered.contains(MSG_API_KEY_REQUIRED) {
                    AnkiError::ForbiddenOrigin
                } else if lowered.contains(MSG_COLLECTION_UNAVAILABLE) {
                    AnkiError::CollectionUnavailable
                } else if lowered.contains(MSG_NOT_FOUND) {
                    AnkiError::NotFound(msg)
                } else {
                    AnkiError::Server(msg)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_message_maps_to_forbidden_origin() {
        let err = ConnectError::Api("valid api key must be provided".to_string());
        assert_eq!(err.classify(), AnkiError::ForbiddenOrigin);
    }

    #[test]
    fn collection_message_maps_to_collection_unavailable() {
        let err = ConnectError::Api("collection is not available".to_string());
        assert_eq!(err.classify(), AnkiError::CollectionUnavailable);
    }

    #[test]
    fn missing_model_maps_to_not_found() {
        let err = ConnectError::Api("model was not found: Basic".to_string());
        let classified = err.classify();
        assert!(classified.is_not_found());
        assert_eq!(classified, AnkiError::NotFound("model was not found: Basic".to_string()));
    }

    #[test]
    fn unrecognized_message_is_preserved_as_server_error() {
        let err = ConnectError::Api("database is locked".to_string());
        assert_eq!(err.classify(), AnkiError::Server("database is locked".to_string()));
    }
}
