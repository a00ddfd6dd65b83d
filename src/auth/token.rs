// Opaque bearer token issuing and lookup

use rand::Rng;
use std::fmt::Write;
use std::sync::Arc;

use crate::auth::{error::AuthError, models::User, repository::TokenRepository};

/// Length of a token key in hex characters
pub const TOKEN_KEY_LENGTH: usize = 40;

/// Generate a random token key (40 character hex string)
pub fn generate_key() -> String {
    let bytes: [u8; TOKEN_KEY_LENGTH / 2] = rand::thread_rng().gen();

    bytes
        .iter()
        .fold(String::with_capacity(TOKEN_KEY_LENGTH), |mut acc, b| {
            let _ = write!(acc, "{:02x}", b);
            acc
        })
}

/// Mints, revokes and resolves the single token each user may hold
#[derive(Clone)]
pub struct TokenIssuer {
    tokens: Arc<dyn TokenRepository>,
}

impl TokenIssuer {
    pub fn new(tokens: Arc<dyn TokenRepository>) -> Self {
        Self { tokens }
    }

    /// Return the user's token, creating it on first use
    pub async fn issue_or_get(&self, user: &User) -> Result<String, AuthError> {
        let key = self.tokens.insert_or_get(user.id, &generate_key()).await?;
        tracing::debug!("Token ready for user {}", user.id);
        Ok(key)
    }

    /// Delete the user's token
    pub async fn revoke(&self, user: &User) -> Result<(), AuthError> {
        if self.tokens.delete_for_user(user.id).await? {
            tracing::info!("Revoked token for user {}", user.id);
            Ok(())
        } else {
            Err(AuthError::TokenNotFound)
        }
    }

    /// Map a presented key to its owner.
    /// The owner may be inactive; callers decide what that means.
    pub async fn resolve(&self, key: &str) -> Result<User, AuthError> {
        self.tokens
            .find_user_by_key(key)
            .await?
            .ok_or(AuthError::InvalidToken)
    }
}
