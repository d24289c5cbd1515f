//! Account records and session handling.
//!
//! Accounts live in the active storage backend like every other entity, so
//! switching between local and remote storage carries the user table with
//! it. At most one session is active at a time; it is persisted so a
//! restart resumes as the same user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use tracing::info;
use uuid::Uuid;

use crate::storage::{Store, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::User => write!(f, "user"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        name: impl Into<String>,
        role: UserRole,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.into(),
            password: password.into(),
            name: name.into(),
            role,
            created_at: Utc::now(),
        }
    }
}

/// Snapshot of the signed-in user, safe to persist and display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn for_user(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            started_at: Utc::now(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Debug)]
pub enum AuthError {
    EmailTaken(String),
    InvalidCredentials,
    Storage(StorageError),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::EmailTaken(email) => {
                write!(f, "an account already exists for {email}")
            }
            AuthError::InvalidCredentials => write!(f, "invalid email or password"),
            AuthError::Storage(err) => write!(f, "storage error: {err}"),
        }
    }
}

impl StdError for AuthError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            AuthError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::Storage(err)
    }
}

pub struct AuthManager {
    store: Store,
}

impl AuthManager {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Register a new account and sign it in.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Session, AuthError> {
        if self.store.find_user_by_email(email).await?.is_some() {
            return Err(AuthError::EmailTaken(email.to_string()));
        }
        let user = User::new(email, password, name, UserRole::User);
        self.store.put_user(&user).await?;
        let session = Session::for_user(&user);
        self.store.set_active_session(&session).await?;
        info!(email = %user.email, "registered user");
        Ok(session)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .filter(|user| user.password == password)
            .ok_or(AuthError::InvalidCredentials)?;
        let session = Session::for_user(&user);
        self.store.set_active_session(&session).await?;
        info!(email = %user.email, "signed in");
        Ok(session)
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.store.clear_active_session().await?;
        Ok(())
    }

    pub async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        Ok(self.store.active_session().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::mem_store;

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let auth = AuthManager::new(mem_store());
        auth.sign_up("alice@example.com", "pw", "Alice").await.unwrap();
        let session = auth.sign_in("alice@example.com", "pw").await.unwrap();
        assert_eq!(session.name, "Alice");
        assert_eq!(session.role, UserRole::User);
    }

    #[test]
    fn session_role_mirrors_the_user() {
        let admin = Session::for_user(&User::new("a@example.com", "pw", "A", UserRole::Admin));
        assert!(admin.is_admin());
        let user = Session::for_user(&User::new("b@example.com", "pw", "B", UserRole::User));
        assert!(!user.is_admin());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let auth = AuthManager::new(mem_store());
        auth.sign_up("alice@example.com", "pw", "Alice").await.unwrap();
        let err = auth.sign_up("Alice@Example.com", "pw2", "Alice 2").await;
        assert!(matches!(err, Err(AuthError::EmailTaken(_))));
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let auth = AuthManager::new(mem_store());
        auth.sign_up("alice@example.com", "pw", "Alice").await.unwrap();
        let err = auth.sign_in("alice@example.com", "nope").await;
        assert!(matches!(err, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn sign_out_clears_persisted_session() {
        let store = mem_store();
        let auth = AuthManager::new(store.clone());
        auth.sign_up("alice@example.com", "pw", "Alice").await.unwrap();
        assert!(auth.current_session().await.unwrap().is_some());
        auth.sign_out().await.unwrap();
        assert!(auth.current_session().await.unwrap().is_none());
    }
}
