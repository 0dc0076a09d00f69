//! Per-request permission resolution.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use super::repository::RoleRepository;
use super::routes::RouteTable;
use crate::cache::PermissionCache;
use crate::db::DbPool;
use crate::{HostError, Result};

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// The route needs permissions but no user was identified.
    Unauthenticated,
    /// The user lacks this permission (the first missing one, in route order).
    MissingPermission(String),
}

/// Outcome of resolving a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(DenyReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }

    /// Convert a denial into the matching error kind.
    pub fn into_result(self) -> Result<()> {
        match self {
            AccessDecision::Allow => Ok(()),
            AccessDecision::Deny(DenyReason::Unauthenticated) => Err(
                HostError::Unauthenticated("authentication required".to_string()),
            ),
            AccessDecision::Deny(DenyReason::MissingPermission(permission)) => {
                Err(HostError::PermissionDenied { permission })
            }
        }
    }
}

/// Resolves `(path, method, user)` against the route table and the user's
/// role-derived permissions, going through the cache first.
#[derive(Debug, Clone)]
pub struct PermissionResolver {
    routes: Arc<RouteTable>,
    cache: Arc<PermissionCache>,
}

impl PermissionResolver {
    pub fn new(routes: Arc<RouteTable>, cache: Arc<PermissionCache>) -> Self {
        Self { routes, cache }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    /// Decide whether `user_id` may call `method path`.
    pub async fn resolve(
        &self,
        pool: &DbPool,
        path: &str,
        method: &str,
        user_id: Option<i64>,
    ) -> Result<AccessDecision> {
        let required = self.routes.required(method, path);
        if required.is_empty() {
            return Ok(AccessDecision::Allow);
        }

        let Some(user_id) = user_id else {
            return Ok(AccessDecision::Deny(DenyReason::Unauthenticated));
        };

        let held = self.user_permissions(pool, user_id).await?;
        Ok(match required.iter().find(|p| !held.contains(p.as_str())) {
            None => AccessDecision::Allow,
            Some(missing) => {
                debug!(user_id, path, method, permission = %missing, "permission denied");
                AccessDecision::Deny(DenyReason::MissingPermission(missing.clone()))
            }
        })
    }

    /// A user's expanded permission set, from cache or freshly loaded.
    pub async fn user_permissions(
        &self,
        pool: &DbPool,
        user_id: i64,
    ) -> Result<Arc<HashSet<String>>> {
        if let Some(set) = self.cache.user_permissions(user_id) {
            debug!(user_id, "permission cache hit");
            return Ok(set);
        }

        let seen = self.cache.user_generation();
        let set = Arc::new(
            RoleRepository::new(pool)
                .effective_permissions(user_id)
                .await?,
        );
        self.cache
            .store_user_permissions(user_id, Arc::clone(&set), seen);
        debug!(user_id, count = set.len(), "permission cache miss");
        Ok(set)
    }

    /// Whether the user holds a single named permission.
    pub async fn has_permission(&self, pool: &DbPool, user_id: i64, permission: &str) -> Result<bool> {
        Ok(self.user_permissions(pool, user_id).await?.contains(permission))
    }
}
