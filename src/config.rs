// Runtime configuration read from the environment

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::auth::password::{HashingConfig, PasswordPolicy};

/// Configuration loading errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Superuser provisioned at startup when absent
#[derive(Clone, PartialEq)]
pub struct AdminBootstrap {
    pub email: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("email", &self.email)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub database_max_connections: u32,
    pub hashing: HashingConfig,
    pub password_policy: PasswordPolicy,
    pub admin: Option<AdminBootstrap>,
}

impl Config {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL`: PostgreSQL connection string (required)
    /// - `HOST`: bind address (default: "0.0.0.0")
    /// - `PORT`: bind port (default: 8080)
    /// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 5)
    /// - `PASSWORD_MIN_LENGTH`: (default: 8)
    /// - `PASSWORD_MAX_SIMILARITY`: 0.0 < x, 1.0 or above disables (default: 0.7)
    /// - `PASSWORD_REJECT_COMMON`, `PASSWORD_REJECT_NUMERIC`: "true"/"false" (default: "true")
    /// - `ARGON2_MEMORY_KIB`, `ARGON2_ITERATIONS`, `ARGON2_PARALLELISM`: Argon2id costs
    /// - `ADMIN_EMAIL`, `ADMIN_USERNAME`, `ADMIN_PASSWORD`: optional, all or none
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let defaults = HashingConfig::default();
        let hashing = HashingConfig {
            memory_kib: parse_or(&lookup, "ARGON2_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_or(&lookup, "ARGON2_ITERATIONS", defaults.iterations)?,
            parallelism: parse_or(&lookup, "ARGON2_PARALLELISM", defaults.parallelism)?,
        };

        let policy_defaults = PasswordPolicy::default();
        let max_similarity: f64 =
            parse_or(&lookup, "PASSWORD_MAX_SIMILARITY", policy_defaults.max_similarity)?;
        if max_similarity.is_nan() || max_similarity <= 0.0 {
            return Err(ConfigError::Invalid {
                name: "PASSWORD_MAX_SIMILARITY",
                value: max_similarity.to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        let password_policy = PasswordPolicy {
            min_length: parse_or(&lookup, "PASSWORD_MIN_LENGTH", policy_defaults.min_length)?,
            max_similarity,
            reject_common: flag_or(&lookup, "PASSWORD_REJECT_COMMON", policy_defaults.reject_common)?,
            reject_numeric: flag_or(
                &lookup,
                "PASSWORD_REJECT_NUMERIC",
                policy_defaults.reject_numeric,
            )?,
            ..policy_defaults
        };

        Ok(Self {
            database_url,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 8080)?,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            hashing,
            password_policy,
            admin: admin_from(&lookup)?,
        })
    }

    /// Socket address string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}

fn flag_or<F>(lookup: &F, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(default);
    };
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value,
            reason: "expected true or false".to_string(),
        }),
    }
}

fn admin_from<F>(lookup: &F) -> Result<Option<AdminBootstrap>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let email = lookup("ADMIN_EMAIL").filter(|v| !v.is_empty());
    let username = lookup("ADMIN_USERNAME").filter(|v| !v.is_empty());
    let password = lookup("ADMIN_PASSWORD").filter(|v| !v.is_empty());

    match (email, username, password) {
        (None, None, None) => Ok(None),
        (Some(email), Some(username), Some(password)) => Ok(Some(AdminBootstrap {
            email,
            username,
            password,
        })),
        (email, username, _) => {
            let missing = if email.is_none() {
                "ADMIN_EMAIL"
            } else if username.is_none() {
                "ADMIN_USERNAME"
            } else {
                "ADMIN_PASSWORD"
            };
            Err(ConfigError::Missing(missing))
        }
    }
}
