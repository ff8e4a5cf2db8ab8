//! Content guards applied to every free-text field before it reaches the vault
//!
//! Mirrors the sanitization rules of the record intake boundary: bounded
//! length plus rejection of quote, comment and script markers.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::LedgerError;

pub const MAX_TEXT_LEN: usize = 255;
pub const MAX_IDENTITY_LEN: usize = 255;

fn injection_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)('|"|;|--|/\*|\*/|xp_)"#).expect("static injection pattern compiles")
    })
}

fn markup_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(<|>|javascript:|vbscript:|data:)").expect("static markup pattern compiles")
    })
}

/// Check a free-text field against length and content guards
pub fn check_safe_text(field: &str, value: &str) -> Result<(), LedgerError> {
    if value.is_empty() {
        return Err(LedgerError::validation(format!("{} must not be empty", field)));
    }

    if value.chars().count() > MAX_TEXT_LEN {
        return Err(LedgerError::validation(format!(
            "{} exceeds {} characters",
            field, MAX_TEXT_LEN
        )));
    }

    if injection_pattern().is_match(value) {
        return Err(LedgerError::validation(format!(
            "{} contains a disallowed statement pattern",
            field
        )));
    }

    if markup_pattern().is_match(value) {
        return Err(LedgerError::validation(format!(
            "{} contains disallowed markup",
            field
        )));
    }

    Ok(())
}

/// Check a record or actor identity
pub fn check_identity(field: &str, id: &str) -> Result<(), LedgerError> {
    if id.trim().is_empty() || id.len() > MAX_IDENTITY_LEN {
        return Err(LedgerError::validation(format!("invalid {}", field)));
    }
    check_safe_text(field, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_text() {
        assert!(check_safe_text("name", "Ada Lovelace").is_ok());
        assert!(check_safe_text("condition", "Type 1 diabetes (insulin)").is_ok());
    }

    #[test]
    fn test_rejects_statement_patterns() {
        assert!(check_safe_text("name", "x'; DROP TABLE records").is_err());
        assert!(check_safe_text("name", "a -- comment").is_err());
        assert!(check_safe_text("name", "exec XP_cmdshell").is_err());
    }

    #[test]
    fn test_rejects_markup() {
        assert!(check_safe_text("name", "<script>").is_err());
        assert!(check_safe_text("name", "JavaScript:alert(1)").is_err());
    }

    #[test]
    fn test_length_bounds() {
        assert!(check_safe_text("name", "").is_err());
        assert!(check_safe_text("name", &"a".repeat(MAX_TEXT_LEN)).is_ok());
        assert!(check_safe_text("name", &"a".repeat(MAX_TEXT_LEN + 1)).is_err());
    }

    #[test]
    fn test_identity_rejects_blank() {
        assert!(check_identity("record id", "   ").is_err());
        assert!(check_identity("record id", "P1").is_ok());
    }
}
