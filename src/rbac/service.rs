//! Role administration with cache invalidation.

use std::collections::{BTreeMap, HashSet};

use tracing::info;

use super::model::{Permission, Role};
use super::repository::{PermissionRepository, RoleRepository};
use super::sync::{sync_role_permissions, SyncReport};
use crate::cache::PermissionCache;
use crate::db::{DbPool, UserRepository};
use crate::{HostError, Result};

/// Role and permission mutations.
///
/// Every method that changes what a user can do invalidates the permission
/// cache before returning: per user for role assignments, wholesale for
/// changes to a role itself.
pub struct RbacService<'a> {
    pool: &'a DbPool,
    cache: &'a PermissionCache,
}

impl<'a> RbacService<'a> {
    pub fn new(pool: &'a DbPool, cache: &'a PermissionCache) -> Self {
        Self { pool, cache }
    }

    async fn role(&self, name: &str) -> Result<Role> {
        RoleRepository::new(self.pool)
            .get_by_name(name)
            .await?
            .ok_or_else(|| HostError::NotFound(format!("role '{name}'")))
    }

    async fn ensure_user(&self, user_id: i64) -> Result<()> {
        match UserRepository::new(self.pool).get_by_id(user_id).await? {
            Some(user) if user.deleted_at.is_none() => Ok(()),
            _ => Err(HostError::NotFound("user".to_string())),
        }
    }

    /// All roles, by name.
    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        RoleRepository::new(self.pool).list().await
    }

    /// All known permissions, by name.
    pub async fn list_permissions(&self) -> Result<Vec<Permission>> {
        PermissionRepository::new(self.pool).list().await
    }

    /// Register a permission no role holds yet.
    pub async fn create_permission(&self, name: &str, description: &str) -> Result<Permission> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HostError::InvalidInput(
                "permission name must not be empty".to_string(),
            ));
        }
        let permission = PermissionRepository::new(self.pool)
            .create(name, description)
            .await?;
        info!(permission = %permission.name, "permission created");
        Ok(permission)
    }

    /// Add the configured roles and grants that are missing from the database.
    pub async fn sync_roles(&self, roles: &BTreeMap<String, Vec<String>>) -> Result<SyncReport> {
        let report = sync_role_permissions(self.pool, roles).await?;
        if report.changed() {
            self.cache.invalidate_all_users();
        }
        Ok(report)
    }

    /// Create a new, active role with no permissions.
    pub async fn create_role(&self, name: &str, description: &str) -> Result<Role> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HostError::InvalidInput("role name must not be empty".to_string()));
        }
        let role = RoleRepository::new(self.pool).create(name, description).await?;
        info!(role = %role.name, "role created");
        Ok(role)
    }

    /// Activate or deactivate a role.
    pub async fn set_role_active(&self, name: &str, is_active: bool) -> Result<()> {
        let role = self.role(name).await?;
        RoleRepository::new(self.pool)
            .set_active(role.id, is_active)
            .await?;
        self.cache.invalidate_all_users();
        info!(role = %name, is_active, "role active flag changed");
        Ok(())
    }

    /// Give a role to a user. Returns false if the user already held it.
    pub async fn assign_role(&self, user_id: i64, role_name: &str) -> Result<bool> {
        self.ensure_user(user_id).await?;
        let role = self.role(role_name).await?;
        let added = RoleRepository::new(self.pool)
            .assign_to_user(user_id, role.id)
            .await?;
        self.cache.invalidate_user(user_id);
        if added {
            info!(user_id, role = %role_name, "role assigned");
        }
        Ok(added)
    }

    /// Take a role from a user. Not holding it is `NotFound`.
    pub async fn remove_role(&self, user_id: i64, role_name: &str) -> Result<()> {
        let role = self.role(role_name).await?;
        let removed = RoleRepository::new(self.pool)
            .remove_from_user(user_id, role.id)
            .await?;
        self.cache.invalidate_user(user_id);
        if !removed {
            return Err(HostError::NotFound(format!(
                "role '{role_name}' on user {user_id}"
            )));
        }
        info!(user_id, role = %role_name, "role removed");
        Ok(())
    }

    /// Attach a permission (created if absent) to a role.
    pub async fn grant_permission(&self, role_name: &str, permission: &str) -> Result<bool> {
        let role = self.role(role_name).await?;
        let permission = PermissionRepository::new(self.pool)
            .get_or_create(permission)
            .await?;
        let added = RoleRepository::new(self.pool)
            .grant(role.id, permission.id)
            .await?;
        self.cache.invalidate_all_users();
        Ok(added)
    }

    /// Detach a permission from a role.
    pub async fn revoke_permission(&self, role_name: &str, permission: &str) -> Result<bool> {
        let role = self.role(role_name).await?;
        let Some(permission) = PermissionRepository::new(self.pool)
            .get_by_name(permission)
            .await?
        else {
            return Ok(false);
        };
        let removed = RoleRepository::new(self.pool)
            .revoke(role.id, permission.id)
            .await?;
        self.cache.invalidate_all_users();
        Ok(removed)
    }

    /// Replace a role's permission set atomically.
    pub async fn replace_role_permissions(
        &self,
        role_name: &str,
        permissions: &[String],
    ) -> Result<()> {
        let role = self.role(role_name).await?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
            .bind(role.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;

        for name in permissions {
            sqlx::query(
                "INSERT OR IGNORE INTO permissions (name, description, created_at) VALUES (?, '', ?)",
            )
            .bind(name)
            .bind(chrono::Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;

            sqlx::query(
                "INSERT OR IGNORE INTO role_permissions (role_id, permission_id)
                 SELECT ?, id FROM permissions WHERE name = ?",
            )
            .bind(role.id)
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        self.cache.invalidate_all_users();
        info!(role = %role_name, count = permissions.len(), "role permissions replaced");
        Ok(())
    }

    /// Roles held by a user.
    pub async fn user_roles(&self, user_id: i64) -> Result<Vec<Role>> {
        RoleRepository::new(self.pool).roles_of_user(user_id).await
    }

    /// A user's effective permissions, read from the database.
    pub async fn user_permissions(&self, user_id: i64) -> Result<HashSet<String>> {
        RoleRepository::new(self.pool)
            .effective_permissions(user_id)
            .await
    }

    /// Permissions attached to a role.
    pub async fn role_permissions(&self, role_name: &str) -> Result<Vec<Permission>> {
        let role = self.role(role_name).await?;
        RoleRepository::new(self.pool).permissions_of(role.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewUser;
    use crate::Database;
    use std::sync::Arc;

    async fn setup() -> (Database, PermissionCache, i64) {
        let db = Database::open_in_memory().await.unwrap();
        let mut roles = BTreeMap::new();
        roles.insert(
            "user".to_string(),
            vec!["view_file".to_string(), "upload_file".to_string()],
        );
        roles.insert("admin".to_string(), vec!["admin".to_string()]);
        sync_role_permissions(db.pool(), &roles).await.unwrap();

        let user = UserRepository::new(db.pool())
            .create(&NewUser::new("alice", "pw"))
            .await
            .unwrap();
        (db, PermissionCache::default(), user.id)
    }

    fn warm(cache: &PermissionCache, user_id: i64) {
        let gen = cache.user_generation();
        cache.store_user_permissions(user_id, Arc::new(HashSet::new()), gen);
    }

    #[tokio::test]
    async fn test_assign_role_invalidates_user() {
        let (db, cache, uid) = setup().await;
        let service = RbacService::new(db.pool(), &cache);
        warm(&cache, uid);

        assert!(service.assign_role(uid, "user").await.unwrap());
        assert!(cache.user_permissions(uid).is_none());
        assert!(!service.assign_role(uid, "user").await.unwrap());

        let perms = service.user_permissions(uid).await.unwrap();
        assert!(perms.contains("upload_file"));
    }

    #[tokio::test]
    async fn test_granting_role_never_removes_permissions() {
        let (db, cache, uid) = setup().await;
        let service = RbacService::new(db.pool(), &cache);
        service.assign_role(uid, "user").await.unwrap();
        let before = service.user_permissions(uid).await.unwrap();

        service.assign_role(uid, "admin").await.unwrap();
        let after = service.user_permissions(uid).await.unwrap();

        assert!(before.is_subset(&after));
        assert!(after.contains("admin"));

        service.remove_role(uid, "admin").await.unwrap();
        assert_eq!(service.user_permissions(uid).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_unknown_targets_are_not_found() {
        let (db, cache, uid) = setup().await;
        let service = RbacService::new(db.pool(), &cache);

        assert!(matches!(
            service.assign_role(uid, "nope").await,
            Err(HostError::NotFound(_))
        ));
        assert!(matches!(
            service.assign_role(999, "user").await,
            Err(HostError::NotFound(_))
        ));
        assert!(matches!(
            service.remove_role(uid, "admin").await,
            Err(HostError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_role_changes_invalidate_everyone() {
        let (db, cache, uid) = setup().await;
        let service = RbacService::new(db.pool(), &cache);
        service.assign_role(uid, "user").await.unwrap();
        warm(&cache, uid);
        warm(&cache, 42);

        service.grant_permission("user", "delete_file").await.unwrap();

        assert!(cache.user_permissions(uid).is_none());
        assert!(cache.user_permissions(42).is_none());
        assert!(service.user_permissions(uid).await.unwrap().contains("delete_file"));

        warm(&cache, uid);
        service.set_role_active("user", false).await.unwrap();
        assert!(cache.user_permissions(uid).is_none());
        assert!(service.user_permissions(uid).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_and_revoke_permissions() {
        let (db, cache, _) = setup().await;
        let service = RbacService::new(db.pool(), &cache);

        service
            .replace_role_permissions("user", &["view_file".to_string(), "tag_file".to_string()])
            .await
            .unwrap();
        let names: Vec<_> = service
            .role_permissions("user")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["tag_file", "view_file"]);

        assert!(service.revoke_permission("user", "tag_file").await.unwrap());
        assert!(!service.revoke_permission("user", "missing").await.unwrap());
        assert_eq!(service.role_permissions("user").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_role() {
        let (db, cache, _) = setup().await;
        let service = RbacService::new(db.pool(), &cache);

        let role = service.create_role(" editor ", "edits").await.unwrap();
        assert_eq!(role.name, "editor");
        assert!(service.create_role("", "").await.is_err());
        assert!(matches!(
            service.create_role("editor", "").await,
            Err(HostError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_sync_roles_invalidates_only_on_change() {
        let (db, cache, uid) = setup().await;
        let service = RbacService::new(db.pool(), &cache);
        service.assign_role(uid, "user").await.unwrap();

        let mut roles = BTreeMap::new();
        roles.insert("user".to_string(), vec!["view_file".to_string()]);
        warm(&cache, uid);
        let report = service.sync_roles(&roles).await.unwrap();
        assert!(!report.changed());
        assert!(cache.user_permissions(uid).is_some());

        roles.insert("user".to_string(), vec!["delete_file".to_string()]);
        let report = service.sync_roles(&roles).await.unwrap();
        assert_eq!(report.grants_created, 1);
        assert!(cache.user_permissions(uid).is_none());
        assert!(service.user_permissions(uid).await.unwrap().contains("delete_file"));
    }

    #[tokio::test]
    async fn test_create_and_list_permissions() {
        let (db, cache, _) = setup().await;
        let service = RbacService::new(db.pool(), &cache);

        service.create_permission("tag_image", "tag images").await.unwrap();
        assert!(service.create_permission("  ", "").await.is_err());
        let names: Vec<_> = service
            .list_permissions()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["admin", "tag_image", "upload_file", "view_file"]);

        let roles: Vec<_> = service
            .list_roles()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(roles, vec!["admin", "user"]);
    }
}
