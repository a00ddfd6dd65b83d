// In-memory repository with the same uniqueness guarantees as the Postgres schema

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::auth::{
    error::{codes, AuthError},
    models::{NewUser, ProfileChanges, User},
    repository::{TokenRepository, UserRepository},
};

/// Row of `auth_tokens`
#[derive(Debug, Clone)]
struct AuthToken {
    key: String,
    user_id: i32,
}

#[derive(Default)]
struct Tables {
    next_id: i32,
    users: HashMap<i32, User>,
    /// Keyed by user id; mirrors `UNIQUE(user_id)`
    tokens: HashMap<i32, AuthToken>,
}

impl Tables {
    fn email_taken(&self, email: &str, exclude_id: Option<i32>) -> bool {
        let email = email.to_lowercase();
        self.users
            .values()
            .any(|u| Some(u.id) != exclude_id && u.email.to_lowercase() == email)
    }

    fn username_taken(&self, username: &str, exclude_id: Option<i32>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != exclude_id && u.username == username)
    }

    fn user_mut(&mut self, id: i32) -> Result<&mut User, AuthError> {
        self.users.get_mut(&id).ok_or(AuthError::UserNotFound)
    }
}

/// Keeps users and tokens in process memory.
/// Every operation runs under one lock, so check-then-insert cannot race.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }

    pub async fn token_count(&self) -> usize {
        self.tables.lock().await.tokens.len()
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn create_user(&self, new_user: NewUser) -> Result<User, AuthError> {
        let mut tables = self.tables.lock().await;

        if tables.email_taken(&new_user.email, None) {
            return Err(AuthError::field(
                "email",
                codes::DUPLICATE_EMAIL,
                "A user with this email already exists.",
            ));
        }
        if tables.username_taken(&new_user.username, None) {
            return Err(AuthError::field(
                "username",
                codes::DUPLICATE_USERNAME,
                "A user with that username already exists.",
            ));
        }

        tables.next_id += 1;
        let user = User {
            id: tables.next_id,
            email: new_user.email,
            username: new_user.username,
            password_hash: new_user.password_hash,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            avatar: None,
            phone: new_user.phone,
            bio: String::new(),
            is_active: true,
            is_staff: new_user.is_staff,
            is_superuser: new_user.is_superuser,
            date_joined: Utc::now(),
            last_login: None,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let email = email.to_lowercase();
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.to_lowercase() == email)
            .cloned())
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<User>, AuthError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn email_taken(&self, email: &str, exclude_id: Option<i32>) -> Result<bool, AuthError> {
        Ok(self.tables.lock().await.email_taken(email, exclude_id))
    }

    async fn username_taken(
        &self,
        username: &str,
        exclude_id: Option<i32>,
    ) -> Result<bool, AuthError> {
        Ok(self.tables.lock().await.username_taken(username, exclude_id))
    }

    async fn record_login(&self, id: i32, at: DateTime<Utc>) -> Result<User, AuthError> {
        let mut tables = self.tables.lock().await;
        let user = tables.user_mut(id)?;
        user.last_login = Some(at);
        Ok(user.clone())
    }

    async fn update_profile(&self, id: i32, changes: ProfileChanges) -> Result<User, AuthError> {
        let mut tables = self.tables.lock().await;

        if let Some(email) = &changes.email {
            if tables.email_taken(email, Some(id)) {
                return Err(AuthError::field(
                    "email",
                    codes::DUPLICATE_EMAIL,
                    "A user with this email already exists.",
                ));
            }
        }
        if let Some(username) = &changes.username {
            if tables.username_taken(username, Some(id)) {
                return Err(AuthError::field(
                    "username",
                    codes::DUPLICATE_USERNAME,
                    "A user with that username already exists.",
                ));
            }
        }

        let user = tables.user_mut(id)?;
        changes.apply_to(user);
        Ok(user.clone())
    }

    async fn set_password_hash(&self, id: i32, password_hash: &str) -> Result<(), AuthError> {
        let mut tables = self.tables.lock().await;
        tables.user_mut(id)?.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn set_active(&self, id: i32, active: bool) -> Result<User, AuthError> {
        let mut tables = self.tables.lock().await;
        let user = tables.user_mut(id)?;
        user.is_active = active;
        Ok(user.clone())
    }
}

#[async_trait]
impl TokenRepository for InMemoryRepository {
    async fn insert_or_get(&self, user_id: i32, candidate_key: &str) -> Result<String, AuthError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&user_id) {
            return Err(AuthError::UserNotFound);
        }

        let token = tables.tokens.entry(user_id).or_insert_with(|| AuthToken {
            key: candidate_key.to_string(),
            user_id,
        });
        Ok(token.key.clone())
    }

    async fn delete_for_user(&self, user_id: i32) -> Result<bool, AuthError> {
        Ok(self.tables.lock().await.tokens.remove(&user_id).is_some())
    }

    async fn find_user_by_key(&self, key: &str) -> Result<Option<User>, AuthError> {
        let tables = self.tables.lock().await;
        let owner = tables
            .tokens
            .values()
            .find(|t| t.key == key)
            .and_then(|t| tables.users.get(&t.user_id))
            .cloned();
        Ok(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn new_user(email: &str, username: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            username: username.to_string(),
            password_hash: "hash".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_assigns_ids_and_defaults() {
        let repo = InMemoryRepository::new();
        let first = repo.create_user(new_user("a@example.com", "a")).await.unwrap();
        let second = repo.create_user(new_user("b@example.com", "b")).await.unwrap();

        assert_eq!(first.id + 1, second.id);
        assert!(first.is_active);
        assert!(!first.is_staff);
        assert!(first.last_login.is_none());
    }

    #[tokio::test]
    async fn test_email_uniqueness_is_case_insensitive() {
        let repo = InMemoryRepository::new();
        repo.create_user(new_user("alice@example.com", "alice")).await.unwrap();

        let err = repo
            .create_user(new_user("ALICE@example.com", "alice2"))
            .await
            .unwrap_err();
        assert!(err.has_field_error("email", codes::DUPLICATE_EMAIL));
        assert_eq!(repo.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_username_uniqueness() {
        let repo = InMemoryRepository::new();
        repo.create_user(new_user("alice@example.com", "alice")).await.unwrap();

        let err = repo
            .create_user(new_user("other@example.com", "alice"))
            .await
            .unwrap_err();
        assert!(err.has_field_error("username", codes::DUPLICATE_USERNAME));
    }

    #[tokio::test]
    async fn test_update_profile_rejects_taken_email() {
        let repo = InMemoryRepository::new();
        let alice = repo.create_user(new_user("alice@example.com", "alice")).await.unwrap();
        repo.create_user(new_user("bob@example.com", "bob")).await.unwrap();

        let changes = ProfileChanges {
            email: Some("bob@example.com".to_string()),
            ..Default::default()
        };
        let err = repo.update_profile(alice.id, changes).await.unwrap_err();
        assert!(err.has_field_error("email", codes::DUPLICATE_EMAIL));

        // Keeping one's own email is fine
        let changes = ProfileChanges {
            email: Some("alice@example.com".to_string()),
            ..Default::default()
        };
        assert!(repo.update_profile(alice.id, changes).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_token_inserts_keep_one_row() {
        let repo = Arc::new(InMemoryRepository::new());
        let user = repo.create_user(new_user("a@example.com", "a")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.insert_or_get(user.id, &format!("{:040}", i)).await.unwrap()
            }));
        }

        let mut keys = Vec::new();
        for handle in handles {
            keys.push(handle.await.unwrap());
        }
        keys.dedup();
        assert_eq!(keys.len(), 1);
        assert_eq!(repo.token_count().await, 1);
    }

    #[tokio::test]
    async fn test_token_for_unknown_user_is_rejected() {
        let repo = InMemoryRepository::new();
        let err = repo.insert_or_get(42, "k").await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }
}
