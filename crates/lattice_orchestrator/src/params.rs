//! Parameter injection safety (§4.2, §9): run parameters become
//! session-variable assignments on the pinned connection. Keys are never
//! interpolated as anything but an identifier matching a strict grammar;
//! values are always quoted literals with single quotes doubled.

use crate::error::OrchestratorError;

/// Validate a parameter key against `^[a-zA-Z_][a-zA-Z0-9_]*$`, additionally
/// bounded by `max_identifier_length` (§6).
pub fn validate_parameter_key(key: &str, max_identifier_length: usize) -> Result<(), OrchestratorError> {
    if key.is_empty() || key.len() > max_identifier_length {
        return Err(OrchestratorError::InvalidParameter(format!(
            "parameter key length out of bounds: {key}"
        )));
    }
    let mut chars = key.chars();
    let first = chars.next().expect("checked non-empty above");
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(OrchestratorError::InvalidParameter(format!(
            "parameter key must start with a letter or underscore: {key}"
        )));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(OrchestratorError::InvalidParameter(format!(
            "parameter key contains invalid characters: {key}"
        )));
    }
    Ok(())
}

/// Escape a parameter value for use as a single-quoted SQL literal: double
/// every embedded single quote, nothing else.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Build the `SET` statement for one validated `(key, value)` pair.
pub fn set_statement(key: &str, value: &str) -> String {
    format!("SET {key} = '{}'", escape_literal(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_identifier() {
        assert!(validate_parameter_key("run_date", 128).is_ok());
        assert!(validate_parameter_key("_leading_underscore", 128).is_ok());
    }

    #[test]
    fn rejects_leading_digit() {
        assert!(validate_parameter_key("1abc", 128).is_err());
    }

    #[test]
    fn rejects_embedded_punctuation() {
        assert!(validate_parameter_key("bad-key", 128).is_err());
        assert!(validate_parameter_key("bad key", 128).is_err());
        assert!(validate_parameter_key("bad;key", 128).is_err());
    }

    #[test]
    fn rejects_key_over_length_limit() {
        let key = "a".repeat(10);
        assert!(validate_parameter_key(&key, 5).is_err());
    }

    #[test]
    fn doubles_embedded_single_quotes() {
        assert_eq!(escape_literal("O'Brien"), "O''Brien");
        assert_eq!(set_statement("name", "O'Brien"), "SET name = 'O''Brien'");
    }
}
