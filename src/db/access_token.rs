//! Access token repository.
//!
//! Access tokens are the opaque credentials a reverse proxy presents on
//! every file fetch. Only the SHA-256 digest of each token is stored.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::DbPool;
use crate::{HostError, Result};

/// Lifecycle state of an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    /// Usable until its expiry.
    Active,
    /// Explicitly revoked; never valid again.
    Revoked,
}

impl TokenStatus {
    /// Convert status to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Active => "active",
            TokenStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TokenStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(TokenStatus::Active),
            "revoked" => Ok(TokenStatus::Revoked),
            _ => Err(format!("unknown token status: {s}")),
        }
    }
}

impl TryFrom<String> for TokenStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

/// Stored access token.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccessToken {
    pub id: i64,
    /// Hex SHA-256 digest of the raw token.
    pub token_hash: String,
    /// Owning user.
    pub user_id: i64,
    /// Device identifier supplied by the client or generated.
    pub device_id: String,
    /// Address the token was created from.
    pub ip_address: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: TokenStatus,
    pub expires_at: DateTime<Utc>,
    /// Last successful validation.
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AccessToken {
    /// Active and not yet expired at `now`.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == TokenStatus::Active && self.expires_at > now
    }
}

/// New access token for creation.
#[derive(Debug, Clone)]
pub struct NewAccessToken {
    pub token_hash: String,
    pub user_id: i64,
    pub device_id: String,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
}

const TOKEN_COLUMNS: &str =
    "id, token_hash, user_id, device_id, ip_address, status, expires_at, last_used_at, created_at";

/// Repository for access token operations.
pub struct AccessTokenRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> AccessTokenRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Store a new token.
    pub async fn create(&self, new_token: &NewAccessToken) -> Result<AccessToken> {
        let result = sqlx::query(
            "INSERT INTO access_tokens
                (token_hash, user_id, device_id, ip_address, status, expires_at, created_at)
             VALUES (?, ?, ?, ?, 'active', ?, ?)",
        )
        .bind(&new_token.token_hash)
        .bind(new_token.user_id)
        .bind(&new_token.device_id)
        .bind(&new_token.ip_address)
        .bind(new_token.expires_at)
        .bind(Utc::now())
        .execute(self.pool)
        .await
        .map_err(|e| HostError::Database(e.to_string()))?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| HostError::NotFound("access token".to_string()))
    }

    /// Get a token by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<AccessToken>> {
        let sql = format!("SELECT {TOKEN_COLUMNS} FROM access_tokens WHERE id = ?");
        let token = sqlx::query_as::<_, AccessToken>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(token)
    }

    /// Get a token by the digest of its raw value, whatever its status.
    pub async fn get_by_hash(&self, token_hash: &str) -> Result<Option<AccessToken>> {
        let sql = format!("SELECT {TOKEN_COLUMNS} FROM access_tokens WHERE token_hash = ?");
        let token = sqlx::query_as::<_, AccessToken>(&sql)
            .bind(token_hash)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(token)
    }

    /// List a user's active tokens, newest first.
    pub async fn list_active_for_user(&self, user_id: i64) -> Result<Vec<AccessToken>> {
        let sql = format!(
            "SELECT {TOKEN_COLUMNS} FROM access_tokens
             WHERE user_id = ? AND status = 'active'
             ORDER BY created_at DESC, id DESC"
        );
        let tokens = sqlx::query_as::<_, AccessToken>(&sql)
            .bind(user_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(tokens)
    }

    /// Record a successful use.
    pub async fn touch(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE access_tokens SET last_used_at = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(())
    }

    /// Record a use of the token with this digest.
    pub async fn touch_by_hash(&self, token_hash: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE access_tokens SET last_used_at = ? WHERE token_hash = ?")
            .bind(at)
            .bind(token_hash)
            .execute(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(())
    }

    /// Revoke a token owned by `user_id`.
    ///
    /// Returns false when no active token with that digest belongs to the user.
    pub async fn revoke(&self, token_hash: &str, user_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE access_tokens SET status = 'revoked'
             WHERE token_hash = ? AND user_id = ? AND status = 'active'",
        )
        .bind(token_hash)
        .bind(user_id)
        .execute(self.pool)
        .await
        .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke every active token of a user.
    pub async fn revoke_all_for_user(&self, user_id: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE access_tokens SET status = 'revoked' WHERE user_id = ? AND status = 'active'",
        )
        .bind(user_id)
        .execute(self.pool)
        .await
        .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    /// Delete revoked tokens and tokens that expired before `now`.
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM access_tokens WHERE status = 'revoked' OR expires_at < ?")
                .bind(now)
                .execute(self.pool)
                .await
                .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }
}
