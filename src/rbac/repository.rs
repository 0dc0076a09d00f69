//! Role, permission and assignment repositories.

use std::collections::HashSet;

use chrono::Utc;

use super::model::{Permission, Role};
use crate::db::{is_unique_violation, DbPool};
use crate::{HostError, Result};

const ROLE_COLUMNS: &str = "id, name, description, is_active, created_at";
const PERMISSION_COLUMNS: &str = "id, name, description, created_at";

/// Repository for roles and their assignments.
pub struct RoleRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> RoleRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create an active role.
    pub async fn create(&self, name: &str, description: &str) -> Result<Role> {
        let result = sqlx::query(
            "INSERT INTO roles (name, description, is_active, created_at) VALUES (?, ?, 1, ?)",
        )
        .bind(name)
        .bind(description)
        .bind(Utc::now())
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                HostError::AlreadyExists(format!("role '{name}'"))
            } else {
                HostError::Database(e.to_string())
            }
        })?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| HostError::NotFound("role".to_string()))
    }

    /// Get a role by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = ?");
        let role = sqlx::query_as::<_, Role>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(role)
    }

    /// Get a role by name.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE name = ?");
        let role = sqlx::query_as::<_, Role>(&sql)
            .bind(name)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(role)
    }

    /// List all roles by name.
    pub async fn list(&self) -> Result<Vec<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY name");
        let roles = sqlx::query_as::<_, Role>(&sql)
            .fetch_all(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(roles)
    }

    /// Activate or deactivate a role. Returns false if the role does not exist.
    pub async fn set_active(&self, id: i64, is_active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE roles SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Permissions attached to a role.
    pub async fn permissions_of(&self, role_id: i64) -> Result<Vec<Permission>> {
        let permissions = sqlx::query_as::<_, Permission>(
            "SELECT p.id, p.name, p.description, p.created_at
             FROM permissions p
             JOIN role_permissions rp ON rp.permission_id = p.id
             WHERE rp.role_id = ?
             ORDER BY p.name",
        )
        .bind(role_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(permissions)
    }

    /// Attach a permission to a role. Returns false if already attached.
    pub async fn grant(&self, role_id: i64, permission_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO role_permissions (role_id, permission_id) VALUES (?, ?)",
        )
        .bind(role_id)
        .bind(permission_id)
        .execute(self.pool)
        .await
        .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Detach a permission from a role. Returns false if it was not attached.
    pub async fn revoke(&self, role_id: i64, permission_id: i64) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM role_permissions WHERE role_id = ? AND permission_id = ?")
                .bind(role_id)
                .bind(permission_id)
                .execute(self.pool)
                .await
                .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Give a role to a user. Returns false if the user already holds it.
    pub async fn assign_to_user(&self, user_id: i64, role_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO user_roles (user_id, role_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(role_id)
        .bind(Utc::now())
        .execute(self.pool)
        .await
        .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Take a role from a user. Returns false if the user did not hold it.
    pub async fn remove_from_user(&self, user_id: i64, role_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role_id = ?")
            .bind(user_id)
            .bind(role_id)
            .execute(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Roles held by a user, active or not.
    pub async fn roles_of_user(&self, user_id: i64) -> Result<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(
            "SELECT r.id, r.name, r.description, r.is_active, r.created_at
             FROM roles r
             JOIN user_roles ur ON ur.role_id = r.id
             WHERE ur.user_id = ?
             ORDER BY r.name",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(roles)
    }

    /// Expand a user's permission set.
    ///
    /// Union of the permissions of every active role the user holds. Deleted
    /// or disabled users expand to the empty set.
    pub async fn effective_permissions(&self, user_id: i64) -> Result<HashSet<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT p.name
             FROM users u
             JOIN user_roles ur ON ur.user_id = u.id
             JOIN roles r ON r.id = ur.role_id AND r.is_active = 1
             JOIN role_permissions rp ON rp.role_id = r.id
             JOIN permissions p ON p.id = rp.permission_id
             WHERE u.id = ? AND u.deleted_at IS NULL AND u.status = 'active'",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(names.into_iter().collect())
    }
}

/// Repository for permissions.
pub struct PermissionRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> PermissionRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Get a permission by name.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Permission>> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE name = ?");
        let permission = sqlx::query_as::<_, Permission>(&sql)
            .bind(name)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(permission)
    }

    /// Create a permission. A taken name fails with `AlreadyExists`.
    pub async fn create(&self, name: &str, description: &str) -> Result<Permission> {
        sqlx::query("INSERT INTO permissions (name, description, created_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(description)
            .bind(Utc::now())
            .execute(self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    HostError::AlreadyExists(format!("permission '{name}'"))
                } else {
                    HostError::Database(e.to_string())
                }
            })?;

        self.get_by_name(name)
            .await?
            .ok_or_else(|| HostError::NotFound(format!("permission '{name}'")))
    }

    /// Get a permission by name, creating it if absent.
    pub async fn get_or_create(&self, name: &str) -> Result<Permission> {
        sqlx::query(
            "INSERT OR IGNORE INTO permissions (name, description, created_at) VALUES (?, '', ?)",
        )
        .bind(name)
        .bind(Utc::now())
        .execute(self.pool)
        .await
        .map_err(|e| HostError::Database(e.to_string()))?;

        self.get_by_name(name)
            .await?
            .ok_or_else(|| HostError::NotFound(format!("permission '{name}'")))
    }

    /// List all permissions by name.
    pub async fn list(&self) -> Result<Vec<Permission>> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions ORDER BY name");
        let permissions = sqlx::query_as::<_, Permission>(&sql)
            .fetch_all(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(permissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUser, UserRepository, UserStatus};
    use crate::Database;

    async fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().await.unwrap();
        let user = UserRepository::new(db.pool())
            .create(&NewUser::new("alice", "pw"))
            .await
            .unwrap();
        (db, user.id)
    }

    async fn role_with(db: &Database, name: &str, perms: &[&str]) -> Role {
        let roles = RoleRepository::new(db.pool());
        let permissions = PermissionRepository::new(db.pool());
        let role = roles.create(name, "").await.unwrap();
        for perm in perms {
            let p = permissions.get_or_create(perm).await.unwrap();
            roles.grant(role.id, p.id).await.unwrap();
        }
        role
    }

    #[tokio::test]
    async fn test_create_role_duplicate() {
        let (db, _) = setup().await;
        let repo = RoleRepository::new(db.pool());

        let role = repo.create("editor", "edits").await.unwrap();
        assert!(role.is_active);
        assert_eq!(role.description, "edits");

        let dup = repo.create("editor", "").await;
        assert!(matches!(dup, Err(HostError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_create_permission_duplicate() {
        let (db, _) = setup().await;
        let repo = PermissionRepository::new(db.pool());

        let created = repo.create("tag_image", "tag images").await.unwrap();
        assert_eq!(created.description, "tag images");
        assert!(matches!(
            repo.create("tag_image", "").await,
            Err(HostError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_get_or_create_permission_is_idempotent() {
        let (db, _) = setup().await;
        let repo = PermissionRepository::new(db.pool());

        let a = repo.get_or_create("view_file").await.unwrap();
        let b = repo.get_or_create("view_file").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_effective_permissions_union_of_active_roles() {
        let (db, user_id) = setup().await;
        let repo = RoleRepository::new(db.pool());
        let user_role = role_with(&db, "user", &["upload_file", "view_file"]).await;
        let admin = role_with(&db, "admin", &["admin", "view_file"]).await;

        repo.assign_to_user(user_id, user_role.id).await.unwrap();
        repo.assign_to_user(user_id, admin.id).await.unwrap();

        let perms = repo.effective_permissions(user_id).await.unwrap();
        assert_eq!(perms.len(), 3);
        assert!(perms.contains("admin"));

        repo.set_active(admin.id, false).await.unwrap();
        let perms = repo.effective_permissions(user_id).await.unwrap();
        assert!(!perms.contains("admin"));
        assert!(perms.contains("view_file"));
    }

    #[tokio::test]
    async fn test_removing_role_keeps_permissions_covered_elsewhere() {
        let (db, user_id) = setup().await;
        let repo = RoleRepository::new(db.pool());
        let a = role_with(&db, "a", &["view_file", "upload_file"]).await;
        let b = role_with(&db, "b", &["view_file", "delete_file"]).await;
        repo.assign_to_user(user_id, a.id).await.unwrap();
        repo.assign_to_user(user_id, b.id).await.unwrap();

        assert!(repo.remove_from_user(user_id, b.id).await.unwrap());
        assert!(!repo.remove_from_user(user_id, b.id).await.unwrap());

        let perms = repo.effective_permissions(user_id).await.unwrap();
        let mut names: Vec<_> = perms.into_iter().collect();
        names.sort();
        assert_eq!(names, vec!["upload_file", "view_file"]);
    }

    #[tokio::test]
    async fn test_assign_is_idempotent() {
        let (db, user_id) = setup().await;
        let repo = RoleRepository::new(db.pool());
        let role = role_with(&db, "user", &["view_file"]).await;

        assert!(repo.assign_to_user(user_id, role.id).await.unwrap());
        assert!(!repo.assign_to_user(user_id, role.id).await.unwrap());
        assert_eq!(repo.roles_of_user(user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_banned_user_expands_to_nothing() {
        let (db, user_id) = setup().await;
        let repo = RoleRepository::new(db.pool());
        let role = role_with(&db, "user", &["view_file"]).await;
        repo.assign_to_user(user_id, role.id).await.unwrap();

        UserRepository::new(db.pool())
            .set_status(user_id, UserStatus::Banned)
            .await
            .unwrap();

        assert!(repo.effective_permissions(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_permissions_of_role() {
        let (db, _) = setup().await;
        let repo = RoleRepository::new(db.pool());
        let role = role_with(&db, "user", &["view_file", "upload_file"]).await;

        let perms = repo.permissions_of(role.id).await.unwrap();
        let names: Vec<_> = perms.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["upload_file", "view_file"]);

        let view = PermissionRepository::new(db.pool())
            .get_by_name("view_file")
            .await
            .unwrap()
            .unwrap();
        assert!(repo.revoke(role.id, view.id).await.unwrap());
        assert_eq!(repo.permissions_of(role.id).await.unwrap().len(), 1);
    }
}
