//! User storage and the default principal-loader / credential-verifier
//! collaborators backed by it.
//!
//! The authentication core only ever sees the [`PrincipalLoader`] and
//! [`CredentialVerifier`] traits; this module provides the SQLite-backed
//! implementation used by the server binary and the tests.

use argon2::Argon2;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use crate::auth::{CredentialVerifier, DirectoryError, Principal, PrincipalLoader};

/// A stored user account.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub roles: Vec<String>,
    pub enabled: bool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    display_name: String,
    password_hash: String,
    roles: String,
    enabled: i32,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
            // Roles are stored as a JSON array; treat unreadable data as none.
            roles: serde_json::from_str(&row.roles).unwrap_or_default(),
            password_hash: row.password_hash,
            enabled: row.enabled != 0,
        }
    }
}

/// Store for user accounts.
#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user with the given plaintext password. Returns the user ID.
    pub async fn create(
        &self,
        username: &str,
        display_name: &str,
        password: &str,
        roles: &[&str],
    ) -> Result<i64, UserStoreError> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(UserStoreError::Hash)?
            .to_string();
        let roles_json = serde_json::to_string(roles).unwrap_or_else(|_| "[]".to_string());

        let result = sqlx::query(
            "INSERT INTO users (username, display_name, password_hash, roles) VALUES (?, ?, ?, ?)",
        )
        .bind(username)
        .bind(display_name)
        .bind(&password_hash)
        .bind(&roles_json)
        .execute(&self.pool)
        .await
        .map_err(UserStoreError::Database)?;

        Ok(result.last_insert_rowid())
    }

    /// Get a user by username.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, display_name, password_hash, roles, enabled FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Check whether a username is free.
    pub async fn is_username_available(&self, username: &str) -> Result<bool, sqlx::Error> {
        let count: (i32,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 == 0)
    }

    /// Enable or disable a user account.
    pub async fn set_enabled(&self, id: i64, enabled: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET enabled = ? WHERE id = ?")
            .bind(enabled as i32)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Errors from user store operations.
#[derive(Debug)]
pub enum UserStoreError {
    Database(sqlx::Error),
    Hash(argon2::password_hash::Error),
}

impl std::fmt::Display for UserStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserStoreError::Database(e) => write!(f, "Database error: {}", e),
            UserStoreError::Hash(e) => write!(f, "Password hashing error: {}", e),
        }
    }
}

impl std::error::Error for UserStoreError {}

impl User {
    fn to_principal(&self) -> Principal {
        Principal {
            subject: self.username.clone(),
            display_name: self.display_name.clone(),
            roles: self.roles.clone(),
        }
    }
}

/// SQLite-backed implementation of the external collaborator traits.
#[derive(Clone)]
pub struct UserDirectory {
    users: UserStore,
}

impl UserDirectory {
    pub fn new(users: UserStore) -> Self {
        Self { users }
    }
}

#[async_trait]
impl PrincipalLoader for UserDirectory {
    async fn load_principal(&self, subject: &str) -> Result<Option<Principal>, DirectoryError> {
        let user = self
            .users
            .get_by_username(subject)
            .await
            .map_err(DirectoryError::new)?;
        Ok(user.filter(|u| u.enabled).map(|u| u.to_principal()))
    }
}

#[async_trait]
impl CredentialVerifier for UserDirectory {
    async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Principal>, DirectoryError> {
        let Some(user) = self
            .users
            .get_by_username(username)
            .await
            .map_err(DirectoryError::new)?
        else {
            return Ok(None);
        };

        if !user.enabled {
            return Ok(None);
        }

        let Ok(parsed) = PasswordHash::new(&user.password_hash) else {
            return Ok(None);
        };

        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
        {
            Ok(Some(user.to_principal()))
        } else {
            Ok(None)
        }
    }
}
