//! Bearer token issuance and verification.
//!
//! Tokens are opaque 32-byte random strings handed to the client once at
//! login. Only their SHA-256 digest is stored, with an expiry; a token
//! that has expired is removed on its next lookup.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

pub struct TokenStore {
    pool: SqlitePool,
    default_ttl: Duration,
}

impl TokenStore {
    /// Creates a store issuing tokens valid for `ttl_days`.
    pub fn new(pool: SqlitePool, ttl_days: i64) -> Self {
        Self {
            pool,
            default_ttl: Duration::days(ttl_days),
        }
    }

    /// Issues a new token for the user and returns it.
    ///
    /// The raw token is not recoverable afterwards; only its digest is
    /// kept.
    pub async fn issue(&self, user_id: Uuid) -> Result<String, sqlx::Error> {
        self.issue_with_ttl(user_id, self.default_ttl).await
    }

    pub async fn issue_with_ttl(
        &self,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<String, sqlx::Error> {
        let token = generate_token();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO api_tokens (token_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(token_digest(&token))
        .bind(user_id.to_string())
        .bind(now.to_rfc3339())
        .bind((now + ttl).to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(token)
    }

    /// Resolves a token to its user id.
    ///
    /// Returns `None` for unknown or expired tokens; expired rows are
    /// deleted on the way out.
    pub async fn verify(&self, token: &str) -> Result<Option<Uuid>, sqlx::Error> {
        let digest = token_digest(token);
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT user_id, expires_at FROM api_tokens WHERE token_hash = ?")
                .bind(&digest)
                .fetch_optional(&self.pool)
                .await?;

        let Some((user_id, expires_at)) = row else {
            return Ok(None);
        };

        let expired = chrono::DateTime::parse_from_rfc3339(&expires_at)
            .map(|expiry| expiry < Utc::now())
            .unwrap_or(true);
        if expired {
            sqlx::query("DELETE FROM api_tokens WHERE token_hash = ?")
                .bind(&digest)
                .execute(&self.pool)
                .await?;
            return Ok(None);
        }

        Ok(Uuid::parse_str(&user_id).ok())
    }

    /// Deletes all expired tokens. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM api_tokens WHERE expires_at < ?")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Generates a secure random token: 32 bytes, base64url without padding.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_db, UserRepository};
    use tempfile::TempDir;

    struct TestContext {
        tokens: TokenStore,
        user_id: Uuid,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(Some(db_path)).await.unwrap();
        let user_id = UserRepository::new(pool.clone())
            .create("alice", "alice@example.com", "secret")
            .await
            .unwrap()
            .id;
        TestContext {
            tokens: TokenStore::new(pool, 30),
            user_id,
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_issue_and_verify() {
        let ctx = setup().await;

        let token = ctx.tokens.issue(ctx.user_id).await.unwrap();
        assert_eq!(token.len(), 43); // 32 bytes base64url = 43 chars

        let resolved = ctx.tokens.verify(&token).await.unwrap();
        assert_eq!(resolved, Some(ctx.user_id));

        // Verification is repeatable; the token stays valid until expiry
        let resolved = ctx.tokens.verify(&token).await.unwrap();
        assert_eq!(resolved, Some(ctx.user_id));
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let ctx = setup().await;

        let resolved = ctx.tokens.verify("not-a-token").await.unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn test_expired_token_rejected_and_removed() {
        let ctx = setup().await;

        let token = ctx
            .tokens
            .issue_with_ttl(ctx.user_id, Duration::seconds(-1))
            .await
            .unwrap();

        assert!(ctx.tokens.verify(&token).await.unwrap().is_none());

        // The expired row is gone, not just rejected
        let remaining = ctx.tokens.cleanup_expired().await.unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let ctx = setup().await;

        ctx.tokens
            .issue_with_ttl(ctx.user_id, Duration::seconds(-1))
            .await
            .unwrap();
        ctx.tokens
            .issue_with_ttl(ctx.user_id, Duration::seconds(-1))
            .await
            .unwrap();
        let live = ctx.tokens.issue(ctx.user_id).await.unwrap();

        let removed = ctx.tokens.cleanup_expired().await.unwrap();
        assert_eq!(removed, 2);
        assert!(ctx.tokens.verify(&live).await.unwrap().is_some());
    }

    #[test]
    fn test_generate_token_format() {
        let token = generate_token();
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(token, generate_token());
    }
}
