// Database repositories for users and tokens

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use crate::auth::{
    error::{codes, AuthError},
    models::{NewUser, ProfileChanges, User},
};

/// Name of the unique index on `LOWER(email)`
const EMAIL_UNIQUE_INDEX: &str = "users_email_key";
/// Name of the unique index on `username`
const USERNAME_UNIQUE_INDEX: &str = "users_username_key";

/// Insert-then-read rounds before `insert_or_get` gives up
const INSERT_ATTEMPTS: u32 = 2;

const USER_COLUMNS: &str = "id, email, username, password_hash, first_name, last_name, avatar, \
     phone, bio, is_active, is_staff, is_superuser, date_joined, last_login";

/// Persistence for user records
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user; a taken email or username is reported as a field error
    async fn create_user(&self, user: NewUser) -> Result<User, AuthError>;

    /// Find a user by email (case-insensitive)
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;

    async fn find_by_id(&self, id: i32) -> Result<Option<User>, AuthError>;

    /// Whether another user (not `exclude_id`) already has this email
    async fn email_taken(&self, email: &str, exclude_id: Option<i32>) -> Result<bool, AuthError>;

    /// Whether another user (not `exclude_id`) already has this username
    async fn username_taken(
        &self,
        username: &str,
        exclude_id: Option<i32>,
    ) -> Result<bool, AuthError>;

    async fn record_login(&self, id: i32, at: DateTime<Utc>) -> Result<User, AuthError>;

    async fn update_profile(&self, id: i32, changes: ProfileChanges) -> Result<User, AuthError>;

    /// Replace the stored hash in a single write
    async fn set_password_hash(&self, id: i32, password_hash: &str) -> Result<(), AuthError>;

    async fn set_active(&self, id: i32, active: bool) -> Result<User, AuthError>;
}

/// Persistence for bearer tokens, at most one per user
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Store `candidate_key` unless the user already has a token, then return the user's key
    async fn insert_or_get(&self, user_id: i32, candidate_key: &str) -> Result<String, AuthError>;

    /// Delete the user's token; false when there was none
    async fn delete_for_user(&self, user_id: i32) -> Result<bool, AuthError>;

    /// Owner of the token with this key
    async fn find_user_by_key(&self, key: &str) -> Result<Option<User>, AuthError>;
}

/// Map a unique violation to the matching field error
fn map_unique_violation(e: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return match db_err.constraint() {
                Some(USERNAME_UNIQUE_INDEX) => AuthError::field(
                    "username",
                    codes::DUPLICATE_USERNAME,
                    "A user with that username already exists.",
                ),
                Some(EMAIL_UNIQUE_INDEX) | None => AuthError::field(
                    "email",
                    codes::DUPLICATE_EMAIL,
                    "A user with this email already exists.",
                ),
                Some(other) => AuthError::Internal(format!("unexpected unique violation: {}", other)),
            };
        }
    }
    AuthError::Database(e)
}

/// Postgres-backed user repository
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, AuthError> {
        let query = format!(
            "INSERT INTO users (email, username, password_hash, first_name, last_name, phone, is_staff, is_superuser) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {}",
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.phone)
            .bind(user.is_staff)
            .bind(user.is_superuser)
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique_violation)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let query = format!("SELECT {} FROM users WHERE LOWER(email) = LOWER($1)", USER_COLUMNS);

        let user = sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<User>, AuthError> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);

        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn email_taken(&self, email: &str, exclude_id: Option<i32>) -> Result<bool, AuthError> {
        let exists: Option<bool> = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1) AND ($2::INTEGER IS NULL OR id <> $2))",
        )
        .bind(email)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists.unwrap_or(false))
    }

    async fn username_taken(
        &self,
        username: &str,
        exclude_id: Option<i32>,
    ) -> Result<bool, AuthError> {
        let exists: Option<bool> = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 AND ($2::INTEGER IS NULL OR id <> $2))",
        )
        .bind(username)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists.unwrap_or(false))
    }

    async fn record_login(&self, id: i32, at: DateTime<Utc>) -> Result<User, AuthError> {
        let query = format!(
            "UPDATE users SET last_login = $1 WHERE id = $2 RETURNING {}",
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(at)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    async fn update_profile(&self, id: i32, changes: ProfileChanges) -> Result<User, AuthError> {
        // Transaction so the read-modify-write sees a consistent row
        let mut tx = self.pool.begin().await?;

        let select = format!("SELECT {} FROM users WHERE id = $1 FOR UPDATE", USER_COLUMNS);
        let mut user = sqlx::query_as::<_, User>(&select)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        changes.apply_to(&mut user);

        let update = format!(
            "UPDATE users \
             SET username = $1, email = $2, first_name = $3, last_name = $4, avatar = $5, phone = $6, bio = $7 \
             WHERE id = $8 \
             RETURNING {}",
            USER_COLUMNS
        );
        let updated = sqlx::query_as::<_, User>(&update)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.avatar)
            .bind(&user.phone)
            .bind(&user.bio)
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_unique_violation)?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn set_password_hash(&self, id: i32, password_hash: &str) -> Result<(), AuthError> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }

    async fn set_active(&self, id: i32, active: bool) -> Result<User, AuthError> {
        let query = format!(
            "UPDATE users SET is_active = $1 WHERE id = $2 RETURNING {}",
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(active)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}

/// Postgres-backed token repository
#[derive(Clone)]
pub struct PgTokenRepository {
    pool: PgPool,
}

impl PgTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for PgTokenRepository {
    async fn insert_or_get(&self, user_id: i32, candidate_key: &str) -> Result<String, AuthError> {
        // UNIQUE(user_id) makes concurrent first logins converge on one row.
        // The read is a separate statement so it sees a row committed by a racing insert.
        // A logout can delete that row between the two statements, so the pair runs twice.
        for attempt in 1..=INSERT_ATTEMPTS {
            sqlx::query(
                "INSERT INTO auth_tokens (key, user_id) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING",
            )
            .bind(candidate_key)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

            let key: Option<String> =
                sqlx::query_scalar("SELECT key FROM auth_tokens WHERE user_id = $1")
                    .bind(user_id)
                    .fetch_optional(&self.pool)
                    .await?;

            if let Some(key) = key {
                return Ok(key);
            }
            debug!(
                "Token for user {} was revoked before it could be read (attempt {})",
                user_id, attempt
            );
        }

        Err(AuthError::Internal(format!(
            "token for user {} revoked during every issue attempt",
            user_id
        )))
    }

    async fn delete_for_user(&self, user_id: i32) -> Result<bool, AuthError> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_user_by_key(&self, key: &str) -> Result<Option<User>, AuthError> {
        let query = format!(
            "SELECT {} FROM users WHERE id = (SELECT user_id FROM auth_tokens WHERE key = $1)",
            USER_COLUMNS
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }
}
