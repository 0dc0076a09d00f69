//! In-memory permission and token-access caches.
//!
//! [`PermissionCache`] is built once at startup and shared by handle. It holds
//! two independent maps, each behind its own reader/writer lock:
//!
//! - user id -> expanded permission set, filled lazily by the resolver and
//!   dropped on any role or permission change;
//! - token digest -> owning user, and (token digest, file path) -> granted,
//!   for the reverse-proxy check. These entries expire after a TTL and are
//!   purged immediately on revocation.
//!
//! Each map carries a generation counter that every invalidation bumps.
//! Loaders read the generation before going to the database and only store
//! their result if it is unchanged, so a load racing an invalidation can never
//! put a stale value back.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::debug;

/// Snapshot of a cache generation, taken before a database load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

/// A validated token's owner, as cached for the proxy path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedIdentity {
    pub user_id: i64,
    pub user_name: String,
    /// Expiry of the token itself; the entry is unusable past it.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct UserEntries {
    generation: u64,
    sets: HashMap<i64, Arc<HashSet<String>>>,
}

#[derive(Debug, Clone)]
struct Stamped<T> {
    value: T,
    stamp: u64,
    inserted_at: Instant,
}

#[derive(Debug, Default)]
struct TokenEntries {
    generation: u64,
    identities: HashMap<String, Stamped<CachedIdentity>>,
    /// (token digest, path) -> owning user id of the grant.
    grants: HashMap<(String, String), Stamped<i64>>,
}

impl TokenEntries {
    fn remove_token(&mut self, token_hash: &str) {
        self.identities.remove(token_hash);
        self.grants.retain(|(hash, _), _| hash != token_hash);
    }

    fn remove_user(&mut self, user_id: i64) {
        self.identities.retain(|_, e| e.value.user_id != user_id);
        self.grants.retain(|_, e| e.value != user_id);
    }
}

/// Shared permission and token-access cache.
#[derive(Debug)]
pub struct PermissionCache {
    users: RwLock<UserEntries>,
    tokens: RwLock<TokenEntries>,
    ttl: Duration,
    next_stamp: AtomicU64,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl PermissionCache {
    /// Create a cache whose token entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            users: RwLock::new(UserEntries::default()),
            tokens: RwLock::new(TokenEntries::default()),
            ttl,
            next_stamp: AtomicU64::new(1),
        }
    }

    /// Lifetime of token-access entries.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // ---- user permission sets ----

    /// Cached permission set for a user, if present.
    pub fn user_permissions(&self, user_id: i64) -> Option<Arc<HashSet<String>>> {
        read(&self.users).sets.get(&user_id).cloned()
    }

    /// Current generation of the user-permission map.
    pub fn user_generation(&self) -> Generation {
        Generation(read(&self.users).generation)
    }

    /// Store a freshly loaded permission set.
    ///
    /// Returns false (and stores nothing) if any invalidation happened since
    /// `seen` was taken.
    pub fn store_user_permissions(
        &self,
        user_id: i64,
        permissions: Arc<HashSet<String>>,
        seen: Generation,
    ) -> bool {
        let mut users = write(&self.users);
        if users.generation != seen.0 {
            debug!(user_id, "permission load raced an invalidation, not caching");
            return false;
        }
        users.sets.insert(user_id, permissions);
        true
    }

    /// Drop one user's permission set and the file grants that relied on it.
    pub fn invalidate_user(&self, user_id: i64) {
        {
            let mut users = write(&self.users);
            users.generation += 1;
            users.sets.remove(&user_id);
        }
        let mut tokens = write(&self.tokens);
        tokens.generation += 1;
        tokens.grants.retain(|_, e| e.value != user_id);
        debug!(user_id, "invalidated user permissions");
    }

    /// Drop every cached permission set and every file grant.
    ///
    /// Used for any change to a role's permissions or active flag, since the
    /// set of affected users is not tracked.
    pub fn invalidate_all_users(&self) {
        {
            let mut users = write(&self.users);
            users.generation += 1;
            users.sets.clear();
        }
        let mut tokens = write(&self.tokens);
        tokens.generation += 1;
        tokens.grants.clear();
        debug!("invalidated all user permissions");
    }

    // ---- token access ----

    /// Current generation of the token map.
    pub fn token_generation(&self) -> Generation {
        Generation(read(&self.tokens).generation)
    }

    fn is_fresh<T>(&self, entry: &Stamped<T>) -> bool {
        entry.inserted_at.elapsed() < self.ttl
    }

    /// Cached owner of a token, if present, within TTL and not past the
    /// token's own expiry.
    pub fn token_identity(&self, token_hash: &str) -> Option<CachedIdentity> {
        let stale = {
            let tokens = read(&self.tokens);
            match tokens.identities.get(token_hash) {
                None => return None,
                Some(entry) if self.is_fresh(entry) && entry.value.expires_at > Utc::now() => {
                    return Some(entry.value.clone());
                }
                Some(_) => true,
            }
        };
        if stale {
            write(&self.tokens).remove_token(token_hash);
        }
        None
    }

    /// Whether a grant for `(token, path)` is cached and fresh.
    pub fn file_grant(&self, token_hash: &str, path: &str) -> bool {
        let key = (token_hash.to_string(), path.to_string());
        let tokens = read(&self.tokens);
        tokens
            .grants
            .get(&key)
            .map(|entry| self.is_fresh(entry))
            .unwrap_or(false)
    }

    /// Cache a validated token's owner.
    ///
    /// Ignored if the token map was invalidated since `seen`. When called
    /// inside a tokio runtime a background task removes the entry once the
    /// TTL has elapsed.
    pub fn store_token_identity(
        self: &Arc<Self>,
        token_hash: &str,
        identity: CachedIdentity,
        seen: Generation,
    ) -> bool {
        let stamp = self.next_stamp.fetch_add(1, Ordering::Relaxed);
        {
            let mut tokens = write(&self.tokens);
            if tokens.generation != seen.0 {
                return false;
            }
            tokens.identities.insert(
                token_hash.to_string(),
                Stamped {
                    value: identity,
                    stamp,
                    inserted_at: Instant::now(),
                },
            );
        }

        let key = token_hash.to_string();
        self.schedule_expiry(move |tokens| {
            if tokens.identities.get(&key).map(|e| e.stamp) == Some(stamp) {
                tokens.identities.remove(&key);
            }
        });
        true
    }

    /// Cache a granted file access for `(token, path)`.
    pub fn store_file_grant(
        self: &Arc<Self>,
        token_hash: &str,
        path: &str,
        user_id: i64,
        seen: Generation,
    ) -> bool {
        let stamp = self.next_stamp.fetch_add(1, Ordering::Relaxed);
        let key = (token_hash.to_string(), path.to_string());
        {
            let mut tokens = write(&self.tokens);
            if tokens.generation != seen.0 {
                return false;
            }
            tokens.grants.insert(
                key.clone(),
                Stamped {
                    value: user_id,
                    stamp,
                    inserted_at: Instant::now(),
                },
            );
        }

        self.schedule_expiry(move |tokens| {
            if tokens.grants.get(&key).map(|e| e.stamp) == Some(stamp) {
                tokens.grants.remove(&key);
            }
        });
        true
    }

    /// Remove everything cached for one token. Absent entries are a no-op.
    pub fn purge_token(&self, token_hash: &str) {
        let mut tokens = write(&self.tokens);
        tokens.generation += 1;
        tokens.remove_token(token_hash);
    }

    /// Remove every token entry owned by a user.
    pub fn purge_user_tokens(&self, user_id: i64) {
        let mut tokens = write(&self.tokens);
        tokens.generation += 1;
        tokens.remove_user(user_id);
    }

    /// Forget a user entirely (deleted or banned account).
    pub fn purge_user(&self, user_id: i64) {
        self.invalidate_user(user_id);
        self.purge_user_tokens(user_id);
    }

    /// Number of cached token identities and grants.
    pub fn token_entry_count(&self) -> (usize, usize) {
        let tokens = read(&self.tokens);
        (tokens.identities.len(), tokens.grants.len())
    }

    fn schedule_expiry<F>(self: &Arc<Self>, remove: F)
    where
        F: FnOnce(&mut TokenEntries) + Send + 'static,
    {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let cache: Weak<Self> = Arc::downgrade(self);
        let ttl = self.ttl;
        handle.spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(cache) = cache.upgrade() {
                remove(&mut write(&cache.tokens));
            }
        });
    }
}

impl Default for PermissionCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}
