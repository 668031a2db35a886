//! Account storage and credential checks.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::User;

/// Errors that can occur during account operations.
#[derive(Debug)]
pub enum UserError {
    /// Username or email is already taken.
    AlreadyExists,
    /// Underlying storage error.
    Database(sqlx::Error),
}

impl std::fmt::Display for UserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserError::AlreadyExists => {
                write!(f, "User with this username or email already exists")
            }
            UserError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for UserError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UserError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for UserError {
    fn from(e: sqlx::Error) -> Self {
        UserError::Database(e)
    }
}

pub struct UserRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    email: String,
    created_at: String,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates a new account. Fails if the username or email is taken.
    pub async fn create(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, UserError> {
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT id FROM users WHERE username = ? OR email = ?")
                .bind(username)
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        if existing.is_some() {
            return Err(UserError::AlreadyExists);
        }

        let user = User::new(username, email);
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.email)
        .bind(hash_password(password))
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, username, email, created_at FROM users WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(hydrate_user))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, username, email, created_at FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(hydrate_user))
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, username, email, created_at FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(hydrate_user))
    }

    pub async fn list(&self) -> Result<Vec<User>, sqlx::Error> {
        let rows: Vec<UserRow> =
            sqlx::query_as("SELECT id, username, email, created_at FROM users ORDER BY username")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(hydrate_user).collect())
    }

    /// Returns the user when the username/password pair is valid.
    pub async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let row: Option<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT id, username, email, password_hash, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|(id, username, email, password_hash, created_at)| {
            if verify_password(&password_hash, password) {
                Some(hydrate_user(UserRow {
                    id,
                    username,
                    email,
                    created_at,
                }))
            } else {
                None
            }
        }))
    }
}

fn hydrate_user(row: UserRow) -> User {
    User {
        id: Uuid::parse_str(&row.id).unwrap(),
        username: row.username,
        email: row.email,
        created_at: parse_timestamp(&row.created_at),
    }
}

pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Salted SHA-256 digest, stored as `salt$digest` in hex.
fn hash_password(password: &str) -> String {
    let salt: [u8; 16] = rand::random();
    let salt_hex = hex_encode(&salt);
    let digest = digest_password(&salt_hex, password);
    format!("{}${}", salt_hex, digest)
}

fn verify_password(stored: &str, password: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, digest)) => digest_password(salt, password) == digest,
        None => false,
    }
}

fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use tempfile::TempDir;

    struct TestContext {
        repo: UserRepository,
        _temp_dir: TempDir,
    }

    async fn setup_repo() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(Some(db_path)).await.unwrap();
        TestContext {
            repo: UserRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let ctx = setup_repo().await;

        let created = ctx
            .repo
            .create("alice", "alice@example.com", "secret")
            .await
            .unwrap();
        assert_eq!(created.username, "alice");

        let fetched = ctx.repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);

        let by_email = ctx
            .repo
            .get_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, created.id);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let ctx = setup_repo().await;

        ctx.repo
            .create("alice", "alice@example.com", "secret")
            .await
            .unwrap();

        let result = ctx.repo.create("alice", "other@example.com", "secret").await;
        assert!(matches!(result, Err(UserError::AlreadyExists)));

        let result = ctx.repo.create("alice2", "alice@example.com", "secret").await;
        assert!(matches!(result, Err(UserError::AlreadyExists)));
    }

    #[tokio::test]
    async fn test_verify_credentials() {
        let ctx = setup_repo().await;

        ctx.repo
            .create("alice", "alice@example.com", "secret")
            .await
            .unwrap();

        let ok = ctx.repo.verify_credentials("alice", "secret").await.unwrap();
        assert!(ok.is_some());

        let bad_pass = ctx.repo.verify_credentials("alice", "wrong").await.unwrap();
        assert!(bad_pass.is_none());

        let bad_user = ctx.repo.verify_credentials("bob", "secret").await.unwrap();
        assert!(bad_user.is_none());
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("hunter2");
        assert!(verify_password(&hash, "hunter2"));
        assert!(!verify_password(&hash, "hunter3"));
        // Salted: two hashes of the same password differ
        assert_ne!(hash, hash_password("hunter2"));
    }
}
