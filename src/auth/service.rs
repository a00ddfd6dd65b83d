// Authentication service - business logic layer

use chrono::Utc;
use std::sync::Arc;
use validator::Validate;

use crate::auth::{
    error::AuthError,
    models::{
        AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse, RegisterRequest,
        UpdateProfileRequest, User, UserResponse, VerifyTokenResponse,
    },
    password::{PasswordPolicy, PasswordService},
    repository::{TokenRepository, UserRepository},
    token::TokenIssuer,
    validator::{CredentialValidator, Privileges},
};

/// Authentication service coordinating all auth operations
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    validator: CredentialValidator,
    tokens: TokenIssuer,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn TokenRepository>,
        passwords: PasswordService,
        policy: PasswordPolicy,
    ) -> Self {
        Self {
            validator: CredentialValidator::new(users.clone(), passwords, policy),
            users,
            tokens: TokenIssuer::new(tokens),
        }
    }

    /// Log a user in and hand out their token
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AuthError> {
        request.validate()?;
        let (Some(email), Some(password)) = (request.email, request.password) else {
            return Err(AuthError::Internal(
                "login passed validation without credentials".to_string(),
            ));
        };

        let user = self.validator.validate_login(&email, &password).await?;
        let user = self.users.record_login(user.id, Utc::now()).await?;
        let token = self.tokens.issue_or_get(&user).await?;

        tracing::info!("User {} logged in", user.id);
        Ok(AuthResponse {
            token,
            user: user.into(),
            message: "Login successful".to_string(),
        })
    }

    /// Create an account and hand out its first token
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AuthError> {
        let user = self
            .validator
            .validate_registration(request, Privileges::default())
            .await?;
        let token = self.tokens.issue_or_get(&user).await?;

        Ok(AuthResponse {
            token,
            user: user.into(),
            message: "User registered successfully".to_string(),
        })
    }

    /// Revoke the caller's token
    pub async fn logout(&self, user: &User) -> Result<MessageResponse, AuthError> {
        self.tokens.revoke(user).await?;
        Ok(MessageResponse::new("Logout successful"))
    }

    pub fn profile(&self, user: &User) -> UserResponse {
        user.clone().into()
    }

    /// Apply a profile edit. `partial` selects PATCH semantics.
    pub async fn update_profile(
        &self,
        user: &User,
        request: UpdateProfileRequest,
        partial: bool,
    ) -> Result<UserResponse, AuthError> {
        let changes = self
            .validator
            .validate_profile_update(user, request, partial)
            .await?;
        if changes.is_empty() {
            return Ok(self.profile(user));
        }

        let updated = self.users.update_profile(user.id, changes).await?;
        tracing::info!("Profile updated for user {}", updated.id);
        Ok(updated.into())
    }

    pub async fn change_password(
        &self,
        user: &User,
        request: ChangePasswordRequest,
    ) -> Result<MessageResponse, AuthError> {
        let (old_password, new_password) = CredentialValidator::password_change_fields(request)?;
        self.validator
            .validate_password_change(user, &old_password, &new_password)
            .await?;
        Ok(MessageResponse::new("Password updated successfully"))
    }

    /// Resolve a presented token key to an active user
    pub async fn authenticate(&self, key: &str) -> Result<User, AuthError> {
        let user = self.tokens.resolve(key).await?;
        if !user.is_active {
            return Err(AuthError::InactiveUser);
        }
        Ok(user)
    }

    pub fn verify(&self, user: &User) -> VerifyTokenResponse {
        VerifyTokenResponse {
            valid: true,
            user: self.profile(user),
        }
    }

    /// Create an active staff and superuser account
    pub async fn create_superuser(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let request = RegisterRequest {
            username: Some(username.to_string()),
            email: Some(email.to_string()),
            password: Some(password.to_string()),
            password_confirm: Some(password.to_string()),
            first_name: None,
            last_name: None,
            phone: None,
        };
        let user = self
            .validator
            .validate_registration(request, Privileges::superuser())
            .await?;
        tracing::info!("Created superuser {}", user.id);
        Ok(user)
    }

    /// Create the superuser unless an account with that email exists.
    /// Returns the new user, or `None` when nothing was created.
    pub async fn ensure_superuser(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, AuthError> {
        let email = crate::validation::normalize_email(email);
        if self.users.find_by_email(&email).await?.is_some() {
            tracing::debug!("Superuser {} already present", email);
            return Ok(None);
        }
        self.create_superuser(&email, username, password)
            .await
            .map(Some)
    }

    /// Activate or deactivate an account. Tokens of inactive users stop resolving.
    pub async fn set_active(&self, user_id: i32, active: bool) -> Result<User, AuthError> {
        let user = self.users.set_active(user_id, active).await?;
        tracing::info!("User {} active = {}", user.id, active);
        Ok(user)
    }

    pub async fn reset_password(&self, user_id: i32, new_password: &str) -> Result<(), AuthError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        self.validator
            .validate_password_reset(&user, new_password)
            .await
    }
}
