use std::collections::HashMap;

use serde::{
    Deserialize,
    Serialize,
};

/// A field rendering template, kept as its source text. Compilation happens
/// in the rendering layer; for configuration purposes two templates are the
/// same iff their sources are the same.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldTemplate {
    source: String,
}

impl FieldTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into() }
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Connection slice of the configuration, handed to the transport on every
/// call so that swapping the configuration swaps the target wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub address: String,
    pub api_key: Option<String>,
}

/// Everything the sync client needs to know about the configured Anki
/// target. Immutable once constructed; reconfiguration builds a new value
/// and swaps it in. Equality is structural (template source text included),
/// which is what the config adapter uses to decide whether a reload is
/// needed at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnkiConfig {
    address: String,
    api_key: Option<String>,
    deck: String,
    note_type: String,
    fields: HashMap<String, FieldTemplate>,
}

impl AnkiConfig {
    pub fn new(
        address: impl Into<String>,
        api_key: Option<String>,
        deck: impl Into<String>,
        note_type: impl Into<String>,
        fields: HashMap<String, FieldTemplate>,
    ) -> Self {
        Self {
            address: address.into(),
            api_key,
            deck: deck.into(),
            note_type: note_type.into(),
            fields,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn deck(&self) -> &str {
        &self.deck
    }

    pub fn note_type(&self) -> &str {
        &self.note_type
    }

    pub fn fields(&self) -> &HashMap<String, FieldTemplate> {
        &self.fields
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint { address: self.address.clone(), api_key: self.api_key.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_template(source: &str) -> AnkiConfig {
        let mut fields = HashMap::new();
        fields.insert("Word".to_string(), FieldTemplate::new(source));
        AnkiConfig::new("http://127.0.0.1:8765", None, "Mining", "Basic", fields)
    }

    #[test]
    fn equality_is_template_source_equality() {
        assert_eq!(config_with_template("{{.Word}}"), config_with_template("{{.Word}}"));
        assert_ne!(config_with_template("{{.Word}}"), config_with_template("{{.Reading}}"));
    }

    #[test]
    fn endpoint_carries_connection_slice_only() {
        let config = config_with_template("{{.Word}}");
        let endpoint = config.endpoint();
        assert_eq!(endpoint.address, "http://127.0.0.1:8765");
        assert_eq!(endpoint.api_key, None);
    }
}
