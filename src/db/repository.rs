//! User repository for imghost.

use chrono::Utc;
use sqlx::QueryBuilder;

use super::user::{NewUser, User, UserStatus, UserUpdate};
use super::{is_unique_violation, DbPool};
use crate::{HostError, Result};

const USER_COLUMNS: &str =
    "id, name, email, password, status, created_at, updated_at, deleted_at";

/// Repository for user CRUD operations.
pub struct UserRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new user.
    ///
    /// A name already taken (case-insensitively) fails with `AlreadyExists`.
    pub async fn create(&self, new_user: &NewUser) -> Result<User> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (name, email, password, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&new_user.password)
        .bind(new_user.status.as_str())
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                HostError::AlreadyExists(format!("user '{}'", new_user.name))
            } else {
                HostError::Database(e.to_string())
            }
        })?;

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .ok_or_else(|| HostError::NotFound("user".to_string()))
    }

    /// Get a user by ID, including soft-deleted users.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(user)
    }

    /// Get a non-deleted user by name (case-insensitive).
    pub async fn get_by_name(&self, name: &str) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE name = ? COLLATE NOCASE AND deleted_at IS NULL"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(name)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(user)
    }

    /// Update a user by ID.
    ///
    /// Only fields set in the update are modified. Returns `None` if the
    /// user does not exist or has been deleted.
    pub async fn update(&self, id: i64, update: &UserUpdate) -> Result<Option<User>> {
        if update.is_empty() {
            return Ok(self.get_by_id(id).await?.filter(|u| u.deleted_at.is_none()));
        }

        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE users SET ");
        let mut separated = query.separated(", ");

        if let Some(ref password) = update.password {
            separated.push("password = ");
            separated.push_bind_unseparated(password);
        }
        if let Some(ref email) = update.email {
            separated.push("email = ");
            separated.push_bind_unseparated(email.clone());
        }
        if let Some(status) = update.status {
            separated.push("status = ");
            separated.push_bind_unseparated(status.as_str());
        }
        separated.push("updated_at = ");
        separated.push_bind_unseparated(Utc::now());

        query.push(" WHERE id = ");
        query.push_bind(id);
        query.push(" AND deleted_at IS NULL");

        let result = query
            .build()
            .execute(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_id(id).await
    }

    /// Set a user's status.
    pub async fn set_status(&self, id: i64, status: UserStatus) -> Result<Option<User>> {
        self.update(id, &UserUpdate::new().status(status)).await
    }

    /// List all non-deleted users.
    pub async fn list_all(&self) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY name"
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .fetch_all(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(users)
    }

    /// Check if a name is already taken (case-insensitive, deleted users included).
    pub async fn name_exists(&self, name: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE name = ? COLLATE NOCASE)")
                .bind(name)
                .fetch_one(self.pool)
                .await
                .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(exists)
    }

    /// Soft-delete a user.
    ///
    /// In one transaction: marks the user deleted, removes every role
    /// assignment, revokes every access token and soft-deletes the user's
    /// private files. Returns false if the user was absent or already deleted.
    /// Callers must purge the user from the permission cache afterwards.
    pub async fn soft_delete(&self, id: i64) -> Result<bool> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;

        let result = sqlx::query(
            "UPDATE users SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| HostError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;

        sqlx::query("UPDATE access_tokens SET status = 'revoked' WHERE user_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;

        sqlx::query(
            "UPDATE private_files SET status = 'deleted', deleted_at = ?, updated_at = ?
             WHERE user_id = ? AND status = 'active'",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| HostError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(true)
    }
}
