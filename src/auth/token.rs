//! Access token issuance and revocation.
//!
//! Raw tokens are shown to the owner once, at creation. Only their SHA-256
//! digest is stored, so a leaked database does not leak usable tokens.

use chrono::{Duration, Utc};
use tracing::info;

use crate::cache::PermissionCache;
use crate::db::{AccessToken, AccessTokenRepository, DbPool, NewAccessToken};
use crate::storage::sha256_hex;
use crate::{HostError, Result};

/// Default token lifetime in days.
pub const DEFAULT_EXPIRY_DAYS: i64 = 30;

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A fresh 64-hex-char token from 32 random bytes.
pub fn generate_token() -> String {
    to_hex(&rand::random::<[u8; 32]>())
}

/// A device identifier for clients that do not supply one.
pub fn generate_device_id() -> String {
    format!("dev_{}", to_hex(&rand::random::<[u8; 8]>()))
}

/// A newly created token together with its raw value.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The raw token. Not recoverable later.
    pub token: String,
    pub record: AccessToken,
}

/// Token lifecycle operations.
pub struct TokenService<'a> {
    pool: &'a DbPool,
    cache: &'a PermissionCache,
    expiry_days: i64,
}

impl<'a> TokenService<'a> {
    pub fn new(pool: &'a DbPool, cache: &'a PermissionCache) -> Self {
        Self {
            pool,
            cache,
            expiry_days: DEFAULT_EXPIRY_DAYS,
        }
    }

    /// Override the lifetime of created tokens.
    pub fn with_expiry_days(mut self, days: i64) -> Self {
        self.expiry_days = days;
        self
    }

    /// Issue a token for `user_id`.
    pub async fn create(
        &self,
        user_id: i64,
        device_id: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<IssuedToken> {
        let token = generate_token();
        let device_id = device_id
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .unwrap_or_else(generate_device_id);

        let new_token = NewAccessToken {
            token_hash: sha256_hex(token.as_bytes()),
            user_id,
            device_id,
            ip_address: ip_address.map(str::to_string),
            expires_at: Utc::now() + Duration::days(self.expiry_days),
        };
        let record = AccessTokenRepository::new(self.pool)
            .create(&new_token)
            .await?;

        info!(user_id, token_id = record.id, device_id = %record.device_id, "access token created");
        Ok(IssuedToken { token, record })
    }

    /// Active tokens owned by `user_id`, newest first.
    pub async fn list(&self, user_id: i64) -> Result<Vec<AccessToken>> {
        AccessTokenRepository::new(self.pool)
            .list_active_for_user(user_id)
            .await
    }

    /// Revoke a token by its raw value.
    ///
    /// Tokens owned by someone else are reported as absent. Cached access
    /// decisions for the token are dropped before this returns.
    pub async fn revoke(&self, user_id: i64, token: &str) -> Result<()> {
        let token_hash = sha256_hex(token.as_bytes());
        let revoked = AccessTokenRepository::new(self.pool)
            .revoke(&token_hash, user_id)
            .await?;
        self.cache.purge_token(&token_hash);

        if !revoked {
            return Err(HostError::NotFound("token".to_string()));
        }
        info!(user_id, "access token revoked");
        Ok(())
    }

    /// Revoke every token of a user. Returns how many were active.
    pub async fn revoke_all(&self, user_id: i64) -> Result<u64> {
        let count = AccessTokenRepository::new(self.pool)
            .revoke_all_for_user(user_id)
            .await?;
        self.cache.purge_user_tokens(user_id);
        info!(user_id, count, "all access tokens revoked");
        Ok(count)
    }

    /// Delete expired and revoked token rows.
    pub async fn cleanup(&self) -> Result<u64> {
        AccessTokenRepository::new(self.pool)
            .cleanup_expired(Utc::now())
            .await
    }
}
