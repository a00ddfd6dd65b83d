// Authentication error types and their HTTP representation

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use std::borrow::Cow;
use thiserror::Error;
use tracing::{debug, error, warn};
use validator::{ValidationError, ValidationErrors};

/// Error codes attached to field errors produced outside the derive macros
pub mod codes {
    pub const REQUIRED: &str = "required";
    pub const WEAK_PASSWORD: &str = "weak_password";
    pub const PASSWORD_MISMATCH: &str = "password_mismatch";
    pub const DUPLICATE_EMAIL: &str = "duplicate_email";
    pub const DUPLICATE_USERNAME: &str = "duplicate_username";
    pub const WRONG_OLD_PASSWORD: &str = "wrong_old_password";
    pub const INVALID: &str = "invalid";
    pub const NULL: &str = "null";
}

/// Authentication and account management errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Field-level problems, all collected before the request is rejected
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Unable to log in with provided credentials.")]
    InvalidCredentials,

    /// Correct password, but `is_active` is false
    #[error("User account is disabled.")]
    AccountDisabled,

    #[error("Authentication credentials were not provided.")]
    MissingToken,

    #[error("Invalid token header. {0}")]
    InvalidTokenHeader(&'static str),

    #[error("Invalid token.")]
    InvalidToken,

    /// The token resolved to a deactivated account
    #[error("User inactive or deleted.")]
    InactiveUser,

    /// Logout was requested but the caller holds no token
    #[error("No active session to log out.")]
    TokenNotFound,

    #[error("User not found.")]
    UserNotFound,

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Build a validator error carrying a client-facing message
pub fn field_error(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

impl AuthError {
    /// Shorthand for a validation failure on a single field
    pub fn field(
        field: &'static str,
        code: &'static str,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, field_error(code, message));
        AuthError::Validation(errors)
    }

    /// True when this is a validation error with `code` reported under `field`
    pub fn has_field_error(&self, field: &str, code: &str) -> bool {
        match self {
            AuthError::Validation(errors) => errors
                .field_errors()
                .get(field)
                .map(|errs| errs.iter().any(|e| e.code == code))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_)
            | AuthError::InvalidCredentials
            | AuthError::AccountDisabled
            | AuthError::TokenNotFound
            | AuthError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            AuthError::MissingToken
            | AuthError::InvalidTokenHeader(_)
            | AuthError::InvalidToken
            | AuthError::InactiveUser => StatusCode::UNAUTHORIZED,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Database(_) | AuthError::PasswordHash(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message that is safe to send to clients
    pub fn error_message(&self) -> String {
        match self {
            AuthError::Database(_) | AuthError::PasswordHash(_) | AuthError::Internal(_) => {
                "Internal server error".to_string()
            }
            AuthError::MalformedBody(_) => "Malformed request body".to_string(),
            other => other.to_string(),
        }
    }
}

/// Render collected validation errors as `{field: [messages]}`
fn validation_body(errors: &ValidationErrors) -> Value {
    let mut body = Map::new();
    for (field, errs) in errors.field_errors() {
        let messages = errs
            .iter()
            .map(|e| {
                let text = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                Value::String(text)
            })
            .collect();
        body.insert(field.to_string(), Value::Array(messages));
    }
    Value::Object(body)
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            AuthError::Validation(errors) => {
                debug!("Validation error: {:?}", errors);
                validation_body(errors)
            }
            AuthError::InvalidCredentials | AuthError::AccountDisabled => {
                warn!("Login rejected: {}", self);
                json!({ "error": self.error_message() })
            }
            AuthError::MissingToken
            | AuthError::InvalidTokenHeader(_)
            | AuthError::InvalidToken
            | AuthError::InactiveUser => {
                warn!("Token authentication failed: {}", self);
                json!({ "error": self.error_message() })
            }
            AuthError::MalformedBody(detail) => {
                debug!("Rejected request body: {}", detail);
                json!({ "error": self.error_message() })
            }
            AuthError::Database(e) => {
                error!("Database error in auth: {:?}", e);
                json!({ "error": self.error_message() })
            }
            AuthError::PasswordHash(msg) | AuthError::Internal(msg) => {
                error!("Internal auth error: {}", msg);
                json!({ "error": self.error_message() })
            }
            AuthError::TokenNotFound | AuthError::UserNotFound => {
                debug!("{}", self);
                json!({ "error": self.error_message() })
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<ValidationErrors> for AuthError {
    fn from(errors: ValidationErrors) -> Self {
        AuthError::Validation(errors)
    }
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::MalformedBody(rejection.body_text())
    }
}
