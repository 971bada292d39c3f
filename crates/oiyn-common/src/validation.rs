//! Input validation utilities.
//!
//! Centralized validation helpers used across API routes and the engine.

use validator::Validate;

use crate::error::OiynError;

/// Validate a request body, returning a OiynError::Validation on failure.
pub fn validate_request<T: Validate>(body: &T) -> Result<(), OiynError> {
    body.validate().map_err(|e| OiynError::Validation {
        message: format_validation_errors(e),
    })
}

/// Format validation errors into a human-readable string.
fn format_validation_errors(errors: validator::ValidationErrors) -> String {
    let mut messages = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for '{field}'"))
            })
        })
        .collect::<Vec<_>>();
    // field_errors() iterates a HashMap
    messages.sort();
    messages.join("; ")
}

/// Treat blank strings as absent. Used by sparse updates, where an empty value
/// must never overwrite a stored one.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Treat zero and negative numbers as absent.
pub fn positive(value: Option<i32>) -> Option<i32> {
    value.filter(|v| *v > 0)
}

/// Reject whitespace-only text.
pub fn require_text(field: &str, value: &str) -> Result<(), OiynError> {
    if value.trim().is_empty() {
        return Err(OiynError::Validation {
            message: format!("{field} cannot be empty or whitespace only"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_strings_are_absent() {
        assert_eq!(non_blank(Some("   ".into())), None);
        assert_eq!(non_blank(Some("".into())), None);
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some(" Almaty ".into())), Some("Almaty".into()));
    }

    #[test]
    fn zero_numbers_are_absent() {
        assert_eq!(positive(Some(0)), None);
        assert_eq!(positive(Some(-3)), None);
        assert_eq!(positive(Some(4)), Some(4));
    }

    #[test]
    fn whitespace_text_is_rejected() {
        assert!(require_text("title", " \t").is_err());
        assert!(require_text("title", "Mafia night").is_ok());
    }
}
