// Password hashing and strength policy

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use tokio::task;

use crate::auth::{error::AuthError, models::User};

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashingConfig {
    /// Smallest parameters Argon2 accepts; only suitable for tests
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Password service for hashing and verification
#[derive(Debug, Clone, Default)]
pub struct PasswordService {
    config: HashingConfig,
}

impl PasswordService {
    pub fn new(config: HashingConfig) -> Self {
        Self { config }
    }

    fn argon2(&self) -> Result<Argon2<'static>, AuthError> {
        let params = Params::new(
            self.config.memory_kib,
            self.config.iterations,
            self.config.parallelism,
            None,
        )
        .map_err(|e| AuthError::PasswordHash(format!("invalid Argon2 params: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a password using Argon2id with a fresh random salt
    pub fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::PasswordHash(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// Verify a password against a stored PHC string.
    /// An unparseable hash never matches.
    pub fn verify_password(password: &str, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Stored password hash is not a valid PHC string: {}", e);
                return false;
            }
        };
        // Cost parameters come from the PHC string, not from `self.config`
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// Hash on the blocking pool; Argon2 is CPU-bound
    pub async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let service = self.clone();
        let password = password.to_string();
        task::spawn_blocking(move || service.hash_password(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("password hashing task failed: {}", e)))?
    }

    /// Verify on the blocking pool
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let password = password.to_string();
        let hash = hash.to_string();
        task::spawn_blocking(move || Self::verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Internal(format!("password verification task failed: {}", e)))
    }
}

// ============================================================================
// Strength policy
// ============================================================================

/// Personal information a password must not resemble
#[derive(Debug, Clone, Copy, Default)]
pub struct UserAttributes<'a> {
    pub username: Option<&'a str>,
    pub email: Option<&'a str>,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
}

impl<'a> UserAttributes<'a> {
    pub fn from_user(user: &'a User) -> Self {
        Self {
            username: Some(&user.username),
            email: Some(&user.email),
            first_name: Some(&user.first_name),
            last_name: Some(&user.last_name),
        }
    }

    fn named(&self) -> [(&'static str, Option<&'a str>); 4] {
        [
            ("username", self.username),
            ("email address", self.email),
            ("first name", self.first_name),
            ("last name", self.last_name),
        ]
    }
}

/// Password strength policy
#[derive(Debug, Clone, PartialEq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    /// Reject when the character-overlap ratio with a personal attribute reaches this value.
    /// Anything >= 1.0 disables the check.
    pub max_similarity: f64,
    pub reject_common: bool,
    pub reject_numeric: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 4096,
            max_similarity: 0.7,
            reject_common: true,
            reject_numeric: true,
        }
    }
}

impl PasswordPolicy {
    /// Evaluate every rule and return all failures
    pub fn validate(
        &self,
        password: &str,
        attributes: &UserAttributes<'_>,
    ) -> Result<(), Vec<PasswordError>> {
        let mut failures = Vec::new();
        let length = password.chars().count();

        if length < self.min_length {
            failures.push(PasswordError::TooShort {
                min: self.min_length,
            });
        }
        if length > self.max_length {
            failures.push(PasswordError::TooLong {
                max: self.max_length,
            });
        }
        if self.max_similarity < 1.0 {
            if let Some(attribute) = self.similar_attribute(password, attributes) {
                failures.push(PasswordError::TooSimilar { attribute });
            }
        }
        if self.reject_common && is_common_password(password) {
            failures.push(PasswordError::TooCommon);
        }
        if self.reject_numeric && !password.is_empty() && password.chars().all(|c| c.is_numeric()) {
            failures.push(PasswordError::AllNumeric);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }

    fn similar_attribute(
        &self,
        password: &str,
        attributes: &UserAttributes<'_>,
    ) -> Option<&'static str> {
        let password = password.to_lowercase();
        let password_len = password.chars().count();

        for (name, value) in attributes.named() {
            let Some(value) = value.filter(|v| !v.is_empty()) else {
                continue;
            };
            let value = value.to_lowercase();
            let parts = word_separator()
                .split(&value)
                .map(str::to_string)
                .chain(std::iter::once(value.clone()));

            for part in parts {
                if part.is_empty() || self.length_rules_out(password_len, part.chars().count()) {
                    continue;
                }
                if overlap_ratio(&password, &part) >= self.max_similarity {
                    return Some(name);
                }
            }
        }
        None
    }

    /// A short attribute cannot be similar to a much longer password
    fn length_rules_out(&self, password_len: usize, value_len: usize) -> bool {
        let bound = self.max_similarity / 2.0 * password_len as f64;
        password_len >= 10 * value_len && (value_len as f64) < bound
    }
}

fn word_separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"\W+").expect("separator pattern is valid"))
}

/// `2 * shared characters / total characters`, ignoring order
fn overlap_ratio(a: &str, b: &str) -> f64 {
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return 1.0;
    }

    let mut available: HashMap<char, usize> = HashMap::new();
    for c in b.chars() {
        *available.entry(c).or_default() += 1;
    }

    let mut shared = 0;
    for c in a.chars() {
        if let Some(count) = available.get_mut(&c) {
            if *count > 0 {
                *count -= 1;
                shared += 1;
            }
        }
    }

    2.0 * shared as f64 / total as f64
}

/// Password policy violations
#[derive(Debug, Clone, PartialEq)]
pub enum PasswordError {
    TooShort { min: usize },
    TooLong { max: usize },
    TooSimilar { attribute: &'static str },
    TooCommon,
    AllNumeric,
}

impl fmt::Display for PasswordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { min } => write!(
                f,
                "This password is too short. It must contain at least {} characters.",
                min
            ),
            Self::TooLong { max } => write!(
                f,
                "This password is too long. It must contain at most {} characters.",
                max
            ),
            Self::TooSimilar { attribute } => {
                write!(f, "The password is too similar to the {}.", attribute)
            }
            Self::TooCommon => write!(f, "This password is too common."),
            Self::AllNumeric => write!(f, "This password is entirely numeric."),
        }
    }
}

impl std::error::Error for PasswordError {}

/// Check the password, and the password with trailing digits removed, against the common list
fn is_common_password(password: &str) -> bool {
    let lower = password.trim().to_lowercase();
    if COMMON_PASSWORDS.contains(&lower.as_str()) {
        return true;
    }

    let base = lower.trim_end_matches(|c: char| c.is_ascii_digit());
    base.len() >= 4 && base.len() < lower.len() && COMMON_PASSWORDS.contains(&base)
}

static COMMON_PASSWORDS: &[&str] = &[
    "123456", "password", "12345678", "qwerty", "123456789", "12345", "1234", "111111",
    "1234567", "dragon", "123123", "baseball", "abc123", "football", "monkey", "letmein",
    "shadow", "master", "666666", "qwertyuiop", "123321", "mustang", "1234567890", "michael",
    "654321", "superman", "1qaz2wsx", "7777777", "121212", "000000", "qazwsx", "123qwe",
    "killer", "trustno1", "jordan", "jennifer", "zxcvbnm", "asdfgh", "hunter", "buster",
    "soccer", "harley", "batman", "andrew", "tigger", "sunshine", "iloveyou", "charlie",
    "robert", "thomas", "hockey", "ranger", "daniel", "starwars", "george", "computer",
    "michelle", "jessica", "pepper", "zxcvbn", "555555", "11111111", "131313", "freedom",
    "777777", "maggie", "159753", "aaaaaa", "ginger", "princess", "joshua", "cheese",
    "amanda", "summer", "ashley", "nicole", "chelsea", "biteme", "matthew", "access",
    "yankees", "987654321", "dallas", "austin", "thunder", "taylor", "matrix", "password1",
    "password123", "passw0rd", "admin", "admin123", "administrator", "root", "welcome",
    "welcome1", "login", "guest", "changeme", "letmein1", "test", "test123", "testing",
    "default", "secret", "qwerty123", "iloveyou1", "football1", "whatever", "starwars1",
    "p@ssw0rd", "p@ssword", "q1w2e3r4", "1q2w3e4r", "q1w2e3r4t5", "zaq12wsx", "asdfghjkl",
];

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn alice() -> UserAttributes<'static> {
        UserAttributes {
            username: Some("alice"),
            email: Some("alice@example.com"),
            first_name: Some("Alice"),
            last_name: Some("Liddell"),
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let service = PasswordService::new(HashingConfig::insecure_fast());
        let hash = service.hash_password("StrongPass!23").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("StrongPass!23"));
        assert!(PasswordService::verify_password("StrongPass!23", &hash));
        assert!(!PasswordService::verify_password("StrongPass!24", &hash));
    }

    #[test]
    fn test_hashes_are_salted() {
        let service = PasswordService::new(HashingConfig::insecure_fast());
        let first = service.hash_password("same password").unwrap();
        let second = service.hash_password("same password").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(!PasswordService::verify_password("anything", "not-a-phc-string"));
        assert!(!PasswordService::verify_password("anything", ""));
    }

    #[test]
    fn test_invalid_params_are_reported() {
        let service = PasswordService::new(HashingConfig {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        });
        assert!(matches!(
            service.hash_password("whatever"),
            Err(AuthError::PasswordHash(_))
        ));
    }

    #[tokio::test]
    async fn test_async_hash_and_verify() {
        let service = PasswordService::new(HashingConfig::insecure_fast());
        let hash = service.hash("StrongPass!23").await.unwrap();
        assert!(service.verify("StrongPass!23", &hash).await.unwrap());
        assert!(!service.verify("wrong", &hash).await.unwrap());
    }

    #[test]
    fn test_default_policy_accepts_strong_password() {
        let policy = PasswordPolicy::default();
        assert!(policy.validate("StrongPass!23", &alice()).is_ok());
    }

    #[test]
    fn test_short_password_rejected() {
        let policy = PasswordPolicy::default();
        let failures = policy.validate("aB3$x", &UserAttributes::default()).unwrap_err();
        assert!(failures.contains(&PasswordError::TooShort { min: 8 }));
    }

    #[test]
    fn test_numeric_password_rejected() {
        let policy = PasswordPolicy::default();
        let failures = policy
            .validate("8302759164", &UserAttributes::default())
            .unwrap_err();
        assert!(failures.contains(&PasswordError::AllNumeric));
    }

    #[test]
    fn test_common_password_rejected() {
        let policy = PasswordPolicy::default();
        let failures = policy.validate("password", &UserAttributes::default()).unwrap_err();
        assert!(failures.contains(&PasswordError::TooCommon));

        let failures = policy.validate("Sunshine2024", &UserAttributes::default()).unwrap_err();
        assert!(failures.contains(&PasswordError::TooCommon));
    }

    #[test]
    fn test_all_failures_are_reported_together() {
        let policy = PasswordPolicy::default();
        let failures = policy.validate("12345", &UserAttributes::default()).unwrap_err();
        assert!(failures.contains(&PasswordError::TooShort { min: 8 }));
        assert!(failures.contains(&PasswordError::AllNumeric));
        assert!(failures.contains(&PasswordError::TooCommon));
    }

    #[test]
    fn test_password_similar_to_personal_info() {
        let policy = PasswordPolicy::default();

        let failures = policy.validate("liddell1", &alice()).unwrap_err();
        assert!(failures.contains(&PasswordError::TooSimilar {
            attribute: "last name"
        }));

        let failures = policy.validate("Alice@Example", &alice()).unwrap_err();
        assert!(failures.contains(&PasswordError::TooSimilar {
            attribute: "username"
        }) || failures.contains(&PasswordError::TooSimilar {
            attribute: "email address"
        }));
    }

    #[test]
    fn test_similarity_check_can_be_disabled() {
        let policy = PasswordPolicy {
            max_similarity: 1.0,
            ..PasswordPolicy::default()
        };
        assert!(policy.validate("liddell1", &alice()).is_ok());
    }

    #[test]
    fn test_overlap_ratio() {
        assert_eq!(overlap_ratio("abc", "abc"), 1.0);
        assert_eq!(overlap_ratio("abc", "xyz"), 0.0);
        assert_eq!(overlap_ratio("", ""), 1.0);
        assert!((overlap_ratio("abcd", "ab") - 2.0 * 2.0 / 6.0).abs() < f64::EPSILON);
    }

    proptest! {
        #[test]
        fn prop_numeric_passwords_rejected(password in "[0-9]{8,20}") {
            let policy = PasswordPolicy::default();
            let failures = policy.validate(&password, &UserAttributes::default()).unwrap_err();
            prop_assert!(failures.contains(&PasswordError::AllNumeric));
        }

        #[test]
        fn prop_short_passwords_rejected(password in "[a-zA-Z!#%]{0,7}") {
            let policy = PasswordPolicy::default();
            let failures = policy.validate(&password, &UserAttributes::default()).unwrap_err();
            let too_short = PasswordError::TooShort { min: 8 };
            prop_assert!(failures.contains(&too_short));
        }
    }
}
