use crate::core::AnkiError;

// Characters that break anki's search syntax when embedded in a deck or
// model name, and the extra set its field/template syntax reserves.
const NAME_FORBIDDEN: &[char] = &['"'];
const FIELD_FORBIDDEN: &[char] = &['"', ':', '{', '}'];

fn check(kind: &str, name: &str, forbidden: &[char]) -> Result<(), AnkiError> {
    if name.is_empty() {
        return Err(AnkiError::Validation(format!("{} name must not be empty", kind)));
    }
    if name.trim() != name {
        return Err(AnkiError::Validation(format!(
            "{} name \"{}\" must not start or end with whitespace",
            kind, name
        )));
    }
    if let Some(ch) = name.chars().find(|ch| forbidden.contains(ch)) {
        return Err(AnkiError::Validation(format!(
            "{} name \"{}\" must not contain '{}'",
            kind, name, ch
        )));
    }
    Ok(())
}

/// Deck and note-type names share the same rules. Internal whitespace is
/// fine, anki quotes it in searches itself.
pub fn deck_name(name: &str) -> Result<(), AnkiError> {
    check("deck", name, NAME_FORBIDDEN)
}

pub fn note_type_name(name: &str) -> Result<(), AnkiError> {
    check("note type", name, NAME_FORBIDDEN)
}

pub fn field_name(name: &str) -> Result<(), AnkiError> {
    check("field", name, FIELD_FORBIDDEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deck_names() {
        assert!(deck_name("Mining").is_ok());
        assert!(deck_name("a b").is_ok());
        assert!(deck_name("").is_err());
        assert!(deck_name("  a").is_err());
        assert!(deck_name("a  ").is_err());
        assert!(deck_name("a\"b").is_err());
    }

    #[test]
    fn field_names() {
        assert!(field_name("Word").is_ok());
        assert!(field_name("a:b").is_err());
        assert!(field_name("a{b").is_err());
        assert!(field_name("a}b").is_err());
        assert!(field_name(" a").is_err());
        assert!(field_name("").is_err());
    }

    #[test]
    fn violations_are_validation_errors() {
        assert!(matches!(deck_name("\"quoted\""), Err(AnkiError::Validation(_))));
    }
}
