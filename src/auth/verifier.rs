//! Token-gated file access checks.
//!
//! Called by the reverse proxy on every private file fetch, so the common
//! path answers from the [`PermissionCache`] without touching the database.
//! Revocation purges the cache synchronously; the TTL only bounds how long
//! an unused entry lingers.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::cache::{CachedIdentity, PermissionCache};
use crate::db::{AccessTokenRepository, DbPool, UserRepository};
use crate::files::PrivateFileRepository;
use crate::rbac::PermissionResolver;
use crate::storage::{sha256_hex, FileStore};
use crate::{HostError, Result};

/// Permission that grants access to every user's files.
pub const MANAGE_ALL_FILES: &str = "manage_all_files";

/// Identity behind an allowed file access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAccess {
    pub user_id: i64,
    pub user_name: String,
    /// Whether the decision came from the cache.
    pub cache_hit: bool,
}

/// Validates access tokens and checks file ownership.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    pool: DbPool,
    resolver: Arc<PermissionResolver>,
    store: FileStore,
}

fn invalid_token() -> HostError {
    HostError::Unauthenticated("invalid or expired token".to_string())
}

impl TokenVerifier {
    pub fn new(pool: DbPool, resolver: Arc<PermissionResolver>, store: FileStore) -> Self {
        Self {
            pool,
            resolver,
            store,
        }
    }

    fn cache(&self) -> &Arc<PermissionCache> {
        self.resolver.cache()
    }

    /// Resolve a raw token to its owner.
    ///
    /// Fails with `Unauthenticated` if the token is unknown, revoked,
    /// expired, or belongs to a disabled or deleted account.
    pub async fn validate(&self, token: &str) -> Result<CachedIdentity> {
        self.identify(token).await.map(|(identity, _)| identity)
    }

    async fn identify(&self, token: &str) -> Result<(CachedIdentity, bool)> {
        let token = token.trim();
        if token.is_empty() {
            return Err(HostError::Unauthenticated("missing token".to_string()));
        }
        let token_hash = sha256_hex(token.as_bytes());

        if let Some(identity) = self.cache().token_identity(&token_hash) {
            debug!(user_id = identity.user_id, "token cache hit");
            self.touch_in_background(token_hash);
            return Ok((identity, true));
        }

        let seen = self.cache().token_generation();
        let now = Utc::now();
        let record = AccessTokenRepository::new(&self.pool)
            .get_by_hash(&token_hash)
            .await?
            .ok_or_else(invalid_token)?;
        if !record.is_usable_at(now) {
            debug!(token_id = record.id, "token revoked or expired");
            return Err(invalid_token());
        }

        let user = UserRepository::new(&self.pool)
            .get_by_id(record.user_id)
            .await?
            .filter(|u| u.can_authenticate())
            .ok_or_else(invalid_token)?;

        let identity = CachedIdentity {
            user_id: user.id,
            user_name: user.name,
            expires_at: record.expires_at,
        };
        self.cache()
            .store_token_identity(&token_hash, identity.clone(), seen);
        self.touch(record.id).await;
        Ok((identity, false))
    }

    /// Whether `user_id` may read the private file stored at `path`.
    ///
    /// Only the owner, or a holder of [`MANAGE_ALL_FILES`], may. Paths that
    /// match no active file are refused.
    pub async fn check_file_access(&self, user_id: i64, path: &str) -> Result<bool> {
        let path = self.store.normalize_request_path(path);
        let Some(owner) = PrivateFileRepository::new(&self.pool)
            .owner_of_path(&path)
            .await?
        else {
            return Ok(false);
        };
        if owner == user_id {
            return Ok(true);
        }
        self.resolver
            .has_permission(&self.pool, user_id, MANAGE_ALL_FILES)
            .await
    }

    /// Record a use of a token answered from the cache.
    ///
    /// Runs off the request path; failures are logged and ignored.
    fn touch_in_background(&self, token_hash: String) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(e) = AccessTokenRepository::new(&pool)
                .touch_by_hash(&token_hash, Utc::now())
                .await
            {
                warn!(error = %e, "failed to record token usage");
            }
        });
    }

    async fn touch(&self, token_id: i64) {
        if let Err(e) = AccessTokenRepository::new(&self.pool)
            .touch(token_id, Utc::now())
            .await
        {
            warn!(token_id, error = %e, "failed to record token usage");
        }
    }

    /// Full proxy check: valid token and access to `path`.
    ///
    /// `Unauthenticated` for a bad token, `PermissionDenied` when the token
    /// is fine but the file is not accessible to its owner.
    pub async fn verify_access(&self, token: &str, path: &str) -> Result<VerifiedAccess> {
        let token = token.trim();
        let path = self.store.normalize_request_path(path);
        let token_hash = sha256_hex(token.as_bytes());

        if self.cache().file_grant(&token_hash, &path) {
            if let Some(identity) = self.cache().token_identity(&token_hash) {
                debug!(user_id = identity.user_id, path = %path, "file access cache hit");
                self.touch_in_background(token_hash);
                return Ok(VerifiedAccess {
                    user_id: identity.user_id,
                    user_name: identity.user_name,
                    cache_hit: true,
                });
            }
        }

        let seen = self.cache().token_generation();
        let (identity, _) = self.identify(token).await?;
        if !self.check_file_access(identity.user_id, &path).await? {
            debug!(user_id = identity.user_id, path = %path, "file access denied");
            return Err(HostError::permission_denied("file access"));
        }

        self.cache()
            .store_file_grant(&token_hash, &path, identity.user_id, seen);
        Ok(VerifiedAccess {
            user_id: identity.user_id,
            user_name: identity.user_name,
            cache_hit: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenService;
    use crate::db::{NewUser, UserStatus};
    use crate::files::NewPrivateFile;
    use crate::rbac::{RbacService, RouteTable};
    use crate::Database;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        db: Database,
        cache: Arc<PermissionCache>,
        verifier: TokenVerifier,
        alice: i64,
        bob: i64,
    }

    async fn setup() -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let users = UserRepository::new(db.pool());
        let alice = users.create(&NewUser::new("alice", "hash")).await.unwrap();
        let bob = users.create(&NewUser::new("bob", "hash")).await.unwrap();

        let cache = Arc::new(PermissionCache::default());
        let routes = Arc::new(RouteTable::from_map(&BTreeMap::new()).unwrap());
        let resolver = Arc::new(PermissionResolver::new(routes, cache.clone()));
        let store = FileStore::new(dir.path()).unwrap();
        let verifier = TokenVerifier::new(db.pool().clone(), resolver, store);

        Fixture {
            _dir: dir,
            db,
            cache,
            verifier,
            alice: alice.id,
            bob: bob.id,
        }
    }

    async fn add_file(db: &Database, user_id: i64, hash: &str) -> String {
        let path = FileStore::private_path(user_id, hash, "pdf");
        PrivateFileRepository::new(db.pool())
            .create(&NewPrivateFile {
                user_id,
                name: "doc".to_string(),
                file_hash: hash.to_string(),
                size: 1,
                ext: "pdf".to_string(),
                mime_type: "application/pdf".to_string(),
                storage_path: path.clone(),
                secret_hash: None,
            })
            .await
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_validate_token() {
        let fx = setup().await;
        let issued = TokenService::new(fx.db.pool(), &fx.cache)
            .create(fx.alice, None, None)
            .await
            .unwrap();

        let identity = fx.verifier.validate(&issued.token).await.unwrap();
        assert_eq!(identity.user_id, fx.alice);
        assert_eq!(identity.user_name, "alice");

        let stored = AccessTokenRepository::new(fx.db.pool())
            .get_by_id(issued.record.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.last_used_at.is_some());

        assert!(matches!(
            fx.verifier.validate("deadbeef").await,
            Err(HostError::Unauthenticated(_))
        ));
        assert!(matches!(
            fx.verifier.validate("  ").await,
            Err(HostError::Unauthenticated(_))
        ));
    }

    async fn last_used(db: &Database, token_id: i64) -> Option<chrono::DateTime<Utc>> {
        AccessTokenRepository::new(db.pool())
            .get_by_id(token_id)
            .await
            .unwrap()
            .unwrap()
            .last_used_at
    }

    #[tokio::test]
    async fn test_cached_validate_records_usage() {
        let fx = setup().await;
        let issued = TokenService::new(fx.db.pool(), &fx.cache)
            .create(fx.alice, None, None)
            .await
            .unwrap();
        fx.verifier.validate(&issued.token).await.unwrap();

        sqlx::query("UPDATE access_tokens SET last_used_at = NULL WHERE id = ?")
            .bind(issued.record.id)
            .execute(fx.db.pool())
            .await
            .unwrap();
        assert!(last_used(&fx.db, issued.record.id).await.is_none());

        let path = add_file(&fx.db, fx.alice, "h1").await;
        fx.verifier.verify_access(&issued.token, &path).await.unwrap();
        let cached = fx.verifier.validate(&issued.token).await.unwrap();
        assert_eq!(cached.user_id, fx.alice);

        let mut touched = false;
        for _ in 0..50 {
            if last_used(&fx.db, issued.record.id).await.is_some() {
                touched = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(touched, "cache hit did not refresh last_used_at");
    }

    #[tokio::test]
    async fn test_expired_token_fails() {
        let fx = setup().await;
        let issued = TokenService::new(fx.db.pool(), &fx.cache)
            .with_expiry_days(-1)
            .create(fx.alice, None, None)
            .await
            .unwrap();
        assert!(matches!(
            fx.verifier.validate(&issued.token).await,
            Err(HostError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn test_banned_owner_fails() {
        let fx = setup().await;
        let issued = TokenService::new(fx.db.pool(), &fx.cache)
            .create(fx.alice, None, None)
            .await
            .unwrap();
        UserRepository::new(fx.db.pool())
            .set_status(fx.alice, UserStatus::Banned)
            .await
            .unwrap();
        assert!(fx.verifier.validate(&issued.token).await.is_err());
    }

    #[tokio::test]
    async fn test_check_file_access_owner_only() {
        let fx = setup().await;
        let path = add_file(&fx.db, fx.alice, "h1").await;

        assert!(fx.verifier.check_file_access(fx.alice, &path).await.unwrap());
        assert!(fx
            .verifier
            .check_file_access(fx.alice, &format!("/{path}"))
            .await
            .unwrap());
        assert!(!fx.verifier.check_file_access(fx.bob, &path).await.unwrap());
        assert!(!fx
            .verifier
            .check_file_access(fx.alice, "private/user_1/missing.pdf")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_manage_all_files_grants_access() {
        let fx = setup().await;
        let path = add_file(&fx.db, fx.alice, "h1").await;
        let rbac = RbacService::new(fx.db.pool(), &fx.cache);
        rbac.create_role("auditor", "").await.unwrap();
        rbac.grant_permission("auditor", MANAGE_ALL_FILES).await.unwrap();
        rbac.assign_role(fx.bob, "auditor").await.unwrap();

        assert!(fx.verifier.check_file_access(fx.bob, &path).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_access_caches_and_revoke_purges() {
        let fx = setup().await;
        let path = add_file(&fx.db, fx.alice, "h1").await;
        let tokens = TokenService::new(fx.db.pool(), &fx.cache);
        let issued = tokens.create(fx.alice, None, None).await.unwrap();

        let first = fx.verifier.verify_access(&issued.token, &path).await.unwrap();
        assert_eq!(first.user_id, fx.alice);
        assert!(!first.cache_hit);

        let second = fx.verifier.verify_access(&issued.token, &path).await.unwrap();
        assert!(second.cache_hit);

        tokens.revoke(fx.alice, &issued.token).await.unwrap();
        assert_eq!(fx.cache.token_entry_count(), (0, 0));
        assert!(matches!(
            fx.verifier.verify_access(&issued.token, &path).await,
            Err(HostError::Unauthenticated(_))
        ));
        assert!(matches!(
            fx.verifier.validate(&issued.token).await,
            Err(HostError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_access_denies_other_users_file() {
        let fx = setup().await;
        let path = add_file(&fx.db, fx.alice, "h1").await;
        let issued = TokenService::new(fx.db.pool(), &fx.cache)
            .create(fx.bob, None, None)
            .await
            .unwrap();

        let result = fx.verifier.verify_access(&issued.token, &path).await;
        assert!(matches!(result, Err(HostError::PermissionDenied { .. })));
        assert_eq!(fx.cache.token_entry_count().1, 0);
    }

    #[tokio::test]
    async fn test_concurrent_verification() {
        let fx = setup().await;
        let path = add_file(&fx.db, fx.alice, "h1").await;
        let issued = TokenService::new(fx.db.pool(), &fx.cache)
            .create(fx.alice, None, None)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let verifier = fx.verifier.clone();
            let (token, path) = (issued.token.clone(), path.clone());
            handles.push(tokio::spawn(async move {
                verifier.verify_access(&token, &path).await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap().user_id, fx.alice);
        }
    }
}
