// Credential validation: login, registration, password change and profile edits

use std::sync::Arc;
use validator::{Validate, ValidationErrors};

use crate::auth::{
    error::{codes, field_error, AuthError},
    models::{
        ChangePasswordRequest, NewUser, ProfileChanges, RegisterRequest, UpdateProfileRequest,
        User, AVATAR_MAX_LENGTH,
    },
    password::{PasswordPolicy, PasswordService, UserAttributes},
    repository::UserRepository,
};
use crate::validation::normalize_email;

/// Privilege flags for newly created accounts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Privileges {
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl Privileges {
    pub fn superuser() -> Self {
        Self {
            is_staff: true,
            is_superuser: true,
        }
    }
}

fn has_errors(errors: &ValidationErrors, field: &str) -> bool {
    errors.field_errors().contains_key(field)
}

fn into_result(errors: ValidationErrors) -> Result<(), AuthError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AuthError::Validation(errors))
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

/// Unwrap a field that must not be `null`, remembering the field when it is
fn non_null(
    nulls: &mut Vec<&'static str>,
    field: &'static str,
    value: Option<Option<String>>,
) -> Option<String> {
    if let Some(None) = value {
        nulls.push(field);
    }
    value.flatten()
}

/// Checks credentials and field rules against the user store
#[derive(Clone)]
pub struct CredentialValidator {
    users: Arc<dyn UserRepository>,
    passwords: PasswordService,
    policy: PasswordPolicy,
}

impl CredentialValidator {
    pub fn new(
        users: Arc<dyn UserRepository>,
        passwords: PasswordService,
        policy: PasswordPolicy,
    ) -> Self {
        Self {
            users,
            passwords,
            policy,
        }
    }

    /// Add one error per policy failure under `field`
    fn check_policy(
        &self,
        errors: &mut ValidationErrors,
        field: &'static str,
        password: &str,
        attributes: &UserAttributes<'_>,
    ) {
        if let Err(failures) = self.policy.validate(password, attributes) {
            for failure in failures {
                errors.add(field, field_error(codes::WEAK_PASSWORD, failure.to_string()));
            }
        }
    }

    /// Authenticate by email and password
    pub async fn validate_login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = normalize_email(email);

        let Some(user) = self.users.find_by_email(&email).await? else {
            // Spend the same work as a real verification so timing does not reveal unknown emails
            self.passwords.hash(password).await?;
            tracing::debug!("Login attempt for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.passwords.verify(password, &user.password_hash).await? {
            tracing::debug!("Wrong password for user {}", user.id);
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        Ok(user)
    }

    /// Validate every registration field, then persist the new user
    pub async fn validate_registration(
        &self,
        request: RegisterRequest,
        privileges: Privileges,
    ) -> Result<User, AuthError> {
        let request = RegisterRequest {
            username: trimmed(request.username),
            email: request.email.map(|e| normalize_email(&e)),
            first_name: trimmed(request.first_name),
            last_name: trimmed(request.last_name),
            phone: trimmed(request.phone),
            ..request
        };

        let mut errors = match request.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };

        if let Some(email) = request.email.as_deref() {
            if !has_errors(&errors, "email") && self.users.email_taken(email, None).await? {
                errors.add(
                    "email",
                    field_error(codes::DUPLICATE_EMAIL, "A user with this email already exists."),
                );
            }
        }

        if let Some(username) = request.username.as_deref() {
            if !has_errors(&errors, "username") && self.users.username_taken(username, None).await? {
                errors.add(
                    "username",
                    field_error(
                        codes::DUPLICATE_USERNAME,
                        "A user with that username already exists.",
                    ),
                );
            }
        }

        if let Some(password) = request.password.as_deref() {
            if !has_errors(&errors, "password") {
                let attributes = UserAttributes {
                    username: request.username.as_deref(),
                    email: request.email.as_deref(),
                    first_name: request.first_name.as_deref(),
                    last_name: request.last_name.as_deref(),
                };
                self.check_policy(&mut errors, "password", password, &attributes);
            }

            if let Some(confirm) = request.password_confirm.as_deref() {
                if !has_errors(&errors, "password_confirm") && confirm != password {
                    errors.add(
                        "password_confirm",
                        field_error(codes::PASSWORD_MISMATCH, "Passwords do not match."),
                    );
                }
            }
        }

        into_result(errors)?;

        // Present after a clean validation, but never unwrap
        let (Some(email), Some(username), Some(password)) =
            (request.email, request.username, request.password)
        else {
            return Err(AuthError::Internal(
                "registration passed validation without required fields".to_string(),
            ));
        };

        let password_hash = self.passwords.hash(&password).await?;
        let user = self
            .users
            .create_user(NewUser {
                email,
                username,
                password_hash,
                first_name: request.first_name.unwrap_or_default(),
                last_name: request.last_name.unwrap_or_default(),
                phone: request.phone.unwrap_or_default(),
                is_staff: privileges.is_staff,
                is_superuser: privileges.is_superuser,
            })
            .await?;

        tracing::info!("Registered user {} ({})", user.id, user.username);
        Ok(user)
    }

    /// Check the old password and the new password's strength, then store the new hash
    pub async fn validate_password_change(
        &self,
        user: &User,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let mut errors = ValidationErrors::new();

        if !self.passwords.verify(old_password, &user.password_hash).await? {
            errors.add(
                "old_password",
                field_error(
                    codes::WRONG_OLD_PASSWORD,
                    "Your old password was entered incorrectly. Please enter it again.",
                ),
            );
        }
        self.check_policy(
            &mut errors,
            "new_password",
            new_password,
            &UserAttributes::from_user(user),
        );

        into_result(errors)?;
        self.store_password(user, new_password).await
    }

    /// Administrative reset: policy applies, the old password is not required
    pub async fn validate_password_reset(
        &self,
        user: &User,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let mut errors = ValidationErrors::new();
        self.check_policy(
            &mut errors,
            "new_password",
            new_password,
            &UserAttributes::from_user(user),
        );

        into_result(errors)?;
        self.store_password(user, new_password).await
    }

    async fn store_password(&self, user: &User, new_password: &str) -> Result<(), AuthError> {
        let password_hash = self.passwords.hash(new_password).await?;
        self.users.set_password_hash(user.id, &password_hash).await?;
        tracing::info!("Password changed for user {}", user.id);
        Ok(())
    }

    /// Unpack and check a change-password body
    pub fn password_change_fields(
        request: ChangePasswordRequest,
    ) -> Result<(String, String), AuthError> {
        request.validate()?;
        match (request.old_password, request.new_password) {
            (Some(old), Some(new)) => Ok((old, new)),
            _ => Err(AuthError::Internal(
                "password change passed validation without required fields".to_string(),
            )),
        }
    }

    /// Turn a profile edit into column changes. `partial` is false for PUT,
    /// which requires `username` and `email`.
    pub async fn validate_profile_update(
        &self,
        user: &User,
        request: UpdateProfileRequest,
        partial: bool,
    ) -> Result<ProfileChanges, AuthError> {
        let mut nulls = Vec::new();
        let username = trimmed(non_null(&mut nulls, "username", request.username));
        let email = non_null(&mut nulls, "email", request.email).map(|e| normalize_email(&e));
        let first_name = trimmed(non_null(&mut nulls, "first_name", request.first_name));
        let last_name = trimmed(non_null(&mut nulls, "last_name", request.last_name));
        let phone = trimmed(non_null(&mut nulls, "phone", request.phone));
        let bio = non_null(&mut nulls, "bio", request.bio);
        // Empty string clears the avatar, like null
        let avatar = request
            .avatar
            .map(|a| a.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()));

        let request = UpdateProfileRequest {
            username: username.map(Some),
            email: email.map(Some),
            first_name: first_name.map(Some),
            last_name: last_name.map(Some),
            avatar,
            phone: phone.map(Some),
            bio: bio.map(Some),
        };

        let mut errors = match request.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };
        for field in nulls {
            errors.add(field, field_error(codes::NULL, "This field may not be null."));
        }

        let UpdateProfileRequest {
            username,
            email,
            first_name,
            last_name,
            avatar,
            phone,
            bio,
        } = request;
        let (username, email) = (username.flatten(), email.flatten());

        if !partial {
            for (field, missing) in [
                ("username", username.is_none() && !has_errors(&errors, "username")),
                ("email", email.is_none() && !has_errors(&errors, "email")),
            ] {
                if missing {
                    errors.add(field, field_error(codes::REQUIRED, "This field is required."));
                }
            }
        }

        if let Some(Some(avatar)) = &avatar {
            if avatar.chars().count() > AVATAR_MAX_LENGTH {
                errors.add(
                    "avatar",
                    field_error(
                        codes::INVALID,
                        format!(
                            "Ensure this filename has at most {} characters.",
                            AVATAR_MAX_LENGTH
                        ),
                    ),
                );
            }
        }

        if let Some(email) = email.as_deref() {
            if !has_errors(&errors, "email") && self.users.email_taken(email, Some(user.id)).await? {
                errors.add(
                    "email",
                    field_error(codes::DUPLICATE_EMAIL, "A user with this email already exists."),
                );
            }
        }

        if let Some(username) = username.as_deref() {
            if !has_errors(&errors, "username")
                && self.users.username_taken(username, Some(user.id)).await?
            {
                errors.add(
                    "username",
                    field_error(
                        codes::DUPLICATE_USERNAME,
                        "A user with that username already exists.",
                    ),
                );
            }
        }

        into_result(errors)?;

        Ok(ProfileChanges {
            username,
            email,
            first_name: first_name.flatten(),
            last_name: last_name.flatten(),
            avatar,
            phone: phone.flatten(),
            bio: bio.flatten(),
        })
    }
}
