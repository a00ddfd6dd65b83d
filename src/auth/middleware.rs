// Authentication extractor for protected routes

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use tracing::debug;

use crate::auth::{error::AuthError, models::User};
use crate::AppState;

/// Accepted keywords in the Authorization header, compared case-insensitively
const KEYWORDS: [&str; 2] = ["bearer", "token"];

/// Authenticated user extractor for protected routes
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
}

/// Pull the token key out of `Authorization: Bearer <key>` or `Authorization: Token <key>`
pub fn token_from_headers(headers: &HeaderMap) -> Result<String, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| {
            AuthError::InvalidTokenHeader("Token string should not contain invalid characters.")
        })?;

    let mut parts = value.split_whitespace();
    let keyword = parts.next().ok_or(AuthError::MissingToken)?;
    if !KEYWORDS.iter().any(|k| keyword.eq_ignore_ascii_case(k)) {
        // Some other scheme; treat as no credentials
        debug!("Ignoring Authorization header with unsupported scheme");
        return Err(AuthError::MissingToken);
    }

    let key = parts
        .next()
        .ok_or(AuthError::InvalidTokenHeader("No credentials provided."))?;
    if parts.next().is_some() {
        return Err(AuthError::InvalidTokenHeader(
            "Token string should not contain spaces.",
        ));
    }

    Ok(key.to_string())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let endpoint = parts.uri.path().to_string();

        let token = token_from_headers(&parts.headers).map_err(|e| {
            debug!("Rejected credentials for {}: {}", endpoint, e);
            e
        })?;

        let state = AppState::from_ref(state);
        let user = state.auth.authenticate(&token).await?;

        debug!("Authenticated user {} for {}", user.id, endpoint);
        Ok(AuthenticatedUser { user })
    }
}
