// Validation utilities module
// Provides custom validation functions for account fields

use regex::Regex;
use std::sync::OnceLock;
use validator::ValidationError;

/// Letters, digits and `@ . + - _`
fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\w.@+-]+$").expect("username pattern is valid"))
}

/// Validates that a username only contains letters, digits and @/./+/-/_
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username_pattern().is_match(username) {
        Ok(())
    } else {
        let mut error = ValidationError::new("invalid_username");
        error.message = Some(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
                .into(),
        );
        Err(error)
    }
}

/// Validates that a value is not empty after trimming
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some("This field may not be blank.".into());
        Err(error)
    } else {
        Ok(())
    }
}

/// Trim surrounding whitespace and lower-case the domain part of an email.
/// The local part is kept as entered.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_usernames() {
        for name in ["alice", "alice.smith", "a+b", "user_1", "me@home", "x-y"] {
            assert!(validate_username(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_invalid_usernames() {
        for name in ["", "with space", "semi;colon", "slash/name", "quote'"] {
            assert!(validate_username(name).is_err(), "{} should be invalid", name);
        }
    }

    #[test]
    fn test_not_blank() {
        assert!(validate_not_blank("x").is_ok());
        assert!(validate_not_blank("").is_err());
        assert!(validate_not_blank("   ").is_err());
    }

    #[test]
    fn test_normalize_email_lowercases_domain_only() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "Alice@example.com");
        assert_eq!(normalize_email("bob@example.com"), "bob@example.com");
        assert_eq!(normalize_email("no-at-sign"), "no-at-sign");
    }
}
