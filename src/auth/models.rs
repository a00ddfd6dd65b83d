// Account data models and DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;
use validator::Validate;

use crate::validation::{validate_not_blank, validate_username};

/// Column width of `users.avatar`
pub const AVATAR_MAX_LENGTH: usize = 100;

/// User database model
#[derive(Clone, FromRow)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    /// Reference to an uploaded image, e.g. `avatars/alice.png`
    pub avatar: Option<String>,
    pub phone: String,
    pub bio: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

// password_hash is left out on purpose
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("username", &self.username)
            .field("is_active", &self.is_active)
            .field("is_staff", &self.is_staff)
            .field("is_superuser", &self.is_superuser)
            .field("date_joined", &self.date_joined)
            .field("last_login", &self.last_login)
            .finish_non_exhaustive()
    }
}

/// Fields for a user about to be inserted. The password is already hashed.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Profile columns to overwrite; `None` leaves the column untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar: Option<Option<String>>,
    pub phone: Option<String>,
    pub bio: Option<String>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the changes to an in-memory user
    pub fn apply_to(self, user: &mut User) {
        if let Some(username) = self.username {
            user.username = username;
        }
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(first_name) = self.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            user.last_name = last_name;
        }
        if let Some(avatar) = self.avatar {
            user.avatar = avatar;
        }
        if let Some(phone) = self.phone {
            user.phone = phone;
        }
        if let Some(bio) = self.bio {
            user.bio = bio;
        }
    }
}

/// Client-facing user view (never includes the password hash)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    #[schema(example = 1)]
    pub id: i32,
    #[schema(example = "alice")]
    pub username: String,
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[schema(example = "Alice")]
    pub first_name: String,
    #[schema(example = "Liddell")]
    pub last_name: String,
    #[schema(example = "avatars/alice.png")]
    pub avatar: Option<String>,
    #[schema(example = "+1 555 0100")]
    pub phone: String,
    pub bio: String,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            avatar: user.avatar,
            phone: user.phone,
            bio: user.bio,
            date_joined: user.date_joined,
            last_login: user.last_login,
        }
    }
}

/// Login request DTO
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(
        required(message = "This field is required."),
        email(message = "Enter a valid email address.")
    )]
    #[schema(example = "alice@example.com")]
    pub email: Option<String>,
    #[validate(
        required(message = "This field is required."),
        length(min = 1, message = "This field may not be blank.")
    )]
    #[schema(example = "StrongPass!23")]
    pub password: Option<String>,
}

/// Registration request DTO
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(
        required(message = "This field is required."),
        length(max = 150, message = "Ensure this field has no more than 150 characters."),
        custom = "validate_username"
    )]
    #[schema(example = "alice")]
    pub username: Option<String>,
    #[validate(
        required(message = "This field is required."),
        email(message = "Enter a valid email address."),
        length(max = 254, message = "Ensure this field has no more than 254 characters.")
    )]
    #[schema(example = "alice@example.com")]
    pub email: Option<String>,
    #[validate(
        required(message = "This field is required."),
        length(min = 1, message = "This field may not be blank.")
    )]
    #[schema(example = "StrongPass!23")]
    pub password: Option<String>,
    #[validate(
        required(message = "This field is required."),
        length(min = 1, message = "This field may not be blank.")
    )]
    #[schema(example = "StrongPass!23")]
    pub password_confirm: Option<String>,
    #[validate(length(max = 30, message = "Ensure this field has no more than 30 characters."))]
    pub first_name: Option<String>,
    #[validate(length(max = 30, message = "Ensure this field has no more than 30 characters."))]
    pub last_name: Option<String>,
    #[validate(length(max = 20, message = "Ensure this field has no more than 20 characters."))]
    pub phone: Option<String>,
}

/// Profile update DTO, shared by PUT and PATCH.
/// Every field keeps an explicit `null` apart from an absent key; only the avatar accepts `null`.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(
        length(max = 150, message = "Ensure this field has no more than 150 characters."),
        custom = "validate_username"
    )]
    #[serde(default, deserialize_with = "deserialize_some")]
    #[schema(value_type = Option<String>, example = "alice")]
    pub username: Option<Option<String>>,
    #[validate(
        email(message = "Enter a valid email address."),
        length(max = 254, message = "Ensure this field has no more than 254 characters.")
    )]
    #[serde(default, deserialize_with = "deserialize_some")]
    #[schema(value_type = Option<String>, example = "alice@example.com")]
    pub email: Option<Option<String>>,
    #[validate(length(max = 30, message = "Ensure this field has no more than 30 characters."))]
    #[serde(default, deserialize_with = "deserialize_some")]
    #[schema(value_type = Option<String>)]
    pub first_name: Option<Option<String>>,
    #[validate(length(max = 30, message = "Ensure this field has no more than 30 characters."))]
    #[serde(default, deserialize_with = "deserialize_some")]
    #[schema(value_type = Option<String>)]
    pub last_name: Option<Option<String>>,
    /// Absent leaves the avatar as is, `null` clears it
    #[serde(default, deserialize_with = "deserialize_some")]
    #[schema(value_type = Option<String>, example = "avatars/alice.png")]
    pub avatar: Option<Option<String>>,
    #[validate(length(max = 20, message = "Ensure this field has no more than 20 characters."))]
    #[serde(default, deserialize_with = "deserialize_some")]
    #[schema(value_type = Option<String>)]
    pub phone: Option<Option<String>>,
    #[validate(length(max = 500, message = "Ensure this field has no more than 500 characters."))]
    #[serde(default, deserialize_with = "deserialize_some")]
    #[schema(value_type = Option<String>)]
    pub bio: Option<Option<String>>,
}

/// Password change request DTO
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(
        required(message = "This field is required."),
        custom = "validate_not_blank"
    )]
    pub old_password: Option<String>,
    #[validate(
        required(message = "This field is required."),
        custom = "validate_not_blank"
    )]
    pub new_password: Option<String>,
}

/// Login and registration response DTO
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    #[schema(example = "9944b09199c62bcf9418ad846dd0e4bbdfc6ee4b")]
    pub token: String,
    pub user: UserResponse,
    #[schema(example = "Login successful")]
    pub message: String,
}

/// Plain confirmation DTO
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Token verification response DTO
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyTokenResponse {
    pub valid: bool,
    pub user: UserResponse,
}

/// Distinguishes an explicit `null` from an absent field
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: 7,
            email: "alice@example.com".to_string(),
            username: "alice".to_string(),
            password_hash: "$argon2id$v=19$m=8,t=1,p=1$c2FsdHNhbHQ$aGFzaA".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
            avatar: None,
            phone: String::new(),
            bio: String::new(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            date_joined: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn test_user_response_excludes_password() {
        let user = sample_user();
        let json = serde_json::to_value(UserResponse::from(user)).unwrap();

        let object = json.as_object().unwrap();
        assert!(!object.contains_key("password"));
        assert!(!object.contains_key("password_hash"));
        assert!(!object.contains_key("is_staff"));
        for key in [
            "id", "username", "email", "first_name", "last_name", "avatar", "phone", "bio",
            "date_joined", "last_login",
        ] {
            assert!(object.contains_key(key), "missing {}", key);
        }
    }

    #[test]
    fn test_debug_redacts_password_hash() {
        let user = sample_user();
        let debug = format!("{:?}", user);
        assert!(!debug.contains("argon2"));
        assert!(debug.contains("alice@example.com"));
    }

    #[test]
    fn test_update_profile_avatar_tristate() {
        let absent: UpdateProfileRequest = serde_json::from_str(r#"{"bio": "hi"}"#).unwrap();
        assert_eq!(absent.avatar, None);

        let cleared: UpdateProfileRequest = serde_json::from_str(r#"{"avatar": null}"#).unwrap();
        assert_eq!(cleared.avatar, Some(None));

        let set: UpdateProfileRequest =
            serde_json::from_str(r#"{"avatar": "avatars/a.png"}"#).unwrap();
        assert_eq!(set.avatar, Some(Some("avatars/a.png".to_string())));
    }

    #[test]
    fn test_update_profile_ignores_read_only_fields() {
        let request: UpdateProfileRequest = serde_json::from_str(
            r#"{"id": 99, "date_joined": "2020-01-01T00:00:00Z", "last_login": null, "bio": "x"}"#,
        )
        .unwrap();
        assert_eq!(request.bio, Some(Some("x".to_string())));
    }

    #[test]
    fn test_update_profile_keeps_explicit_null() {
        let request: UpdateProfileRequest =
            serde_json::from_str(r#"{"email": null, "bio": "x"}"#).unwrap();
        assert_eq!(request.email, Some(None));
        assert_eq!(request.username, None);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_register_request_reports_missing_fields() {
        let request: RegisterRequest = serde_json::from_str("{}").unwrap();
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();

        for field in ["username", "email", "password", "password_confirm"] {
            assert!(fields.contains_key(field), "missing error for {}", field);
        }
        assert!(!fields.contains_key("phone"));
    }

    #[test]
    fn test_register_request_field_limits() {
        let request = RegisterRequest {
            username: Some("bad name".to_string()),
            email: Some("not-an-email".to_string()),
            password: Some("StrongPass!23".to_string()),
            password_confirm: Some("StrongPass!23".to_string()),
            first_name: Some("x".repeat(31)),
            last_name: None,
            phone: Some("1".repeat(21)),
        };
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();

        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("first_name"));
        assert!(fields.contains_key("phone"));
        assert!(!fields.contains_key("password"));
    }

    #[test]
    fn test_profile_changes_apply() {
        let mut user = sample_user();
        let changes = ProfileChanges {
            bio: Some("Down the rabbit hole".to_string()),
            avatar: Some(Some("avatars/alice.png".to_string())),
            ..Default::default()
        };
        assert!(!changes.is_empty());
        changes.apply_to(&mut user);

        assert_eq!(user.bio, "Down the rabbit hole");
        assert_eq!(user.avatar.as_deref(), Some("avatars/alice.png"));
        assert_eq!(user.username, "alice");
        assert!(ProfileChanges::default().is_empty());
    }
}
