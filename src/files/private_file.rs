//! Private file records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::QueryBuilder;

use crate::db::{is_unique_violation, DbPool};
use crate::storage::archive::is_archive_path;
use crate::{HostError, Result};

/// Lifecycle state of a private file row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Active,
    /// Soft-deleted; the row is kept, the stored file is gone.
    Deleted,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Active => "active",
            FileStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(FileStatus::Active),
            "deleted" => Ok(FileStatus::Deleted),
            _ => Err(format!("unknown file status: {s}")),
        }
    }
}

impl TryFrom<String> for FileStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

/// A private file, deduplicated per owner by content hash.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PrivateFile {
    pub id: i64,
    pub user_id: i64,
    /// Display name without extension.
    pub name: String,
    pub file_hash: String,
    pub size: i64,
    pub ext: String,
    pub mime_type: String,
    /// Path relative to the store root; ends in `.zip` while encrypted.
    pub storage_path: String,
    pub is_encrypted: bool,
    /// Argon2 hash of the file password.
    #[serde(skip)]
    pub secret_hash: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: FileStatus,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PrivateFile {
    /// Whether the encryption flag agrees with the on-disk path form.
    pub fn is_consistent(&self) -> bool {
        self.is_encrypted == is_archive_path(&self.storage_path)
            && self.is_encrypted == self.secret_hash.is_some()
    }
}

/// Data for inserting a private file row.
#[derive(Debug, Clone)]
pub struct NewPrivateFile {
    pub user_id: i64,
    pub name: String,
    pub file_hash: String,
    pub size: i64,
    pub ext: String,
    pub mime_type: String,
    pub storage_path: String,
    pub secret_hash: Option<String>,
}

/// Column changes applied by [`PrivateFileRepository::update`].
#[derive(Debug, Clone, Default)]
pub struct PrivateFileChanges {
    pub name: Option<String>,
    /// New path, encryption flag and secret, changed together.
    pub encryption: Option<EncryptionState>,
}

/// Encryption columns of a private file.
#[derive(Debug, Clone)]
pub struct EncryptionState {
    pub storage_path: String,
    pub secret_hash: Option<String>,
}

impl PrivateFileChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.encryption.is_none()
    }
}

const FILE_COLUMNS: &str = "id, user_id, name, file_hash, size, ext, mime_type, storage_path, \
     is_encrypted, secret_hash, status, views, created_at, updated_at, deleted_at";

/// Repository for private file rows.
pub struct PrivateFileRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> PrivateFileRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert an active private file row.
    ///
    /// A second active row with the same owner and hash fails with
    /// `AlreadyExists`.
    pub async fn create(&self, new_file: &NewPrivateFile) -> Result<PrivateFile> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO private_files
                (user_id, name, file_hash, size, ext, mime_type, storage_path,
                 is_encrypted, secret_hash, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?)",
        )
        .bind(new_file.user_id)
        .bind(&new_file.name)
        .bind(&new_file.file_hash)
        .bind(new_file.size)
        .bind(&new_file.ext)
        .bind(&new_file.mime_type)
        .bind(&new_file.storage_path)
        .bind(new_file.secret_hash.is_some())
        .bind(&new_file.secret_hash)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                HostError::AlreadyExists("private file".to_string())
            } else {
                HostError::Database(e.to_string())
            }
        })?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| HostError::NotFound("private file".to_string()))
    }

    /// Get a row by ID in any state.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<PrivateFile>> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM private_files WHERE id = ?");
        sqlx::query_as::<_, PrivateFile>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))
    }

    /// Active file `id` owned by `user_id`.
    pub async fn get_active(&self, id: i64, user_id: i64) -> Result<Option<PrivateFile>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM private_files
             WHERE id = ? AND user_id = ? AND status = 'active'"
        );
        sqlx::query_as::<_, PrivateFile>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))
    }

    /// Active file of `user_id` with the given content hash.
    pub async fn get_active_by_hash(
        &self,
        user_id: i64,
        file_hash: &str,
    ) -> Result<Option<PrivateFile>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM private_files
             WHERE user_id = ? AND file_hash = ? AND status = 'active'"
        );
        sqlx::query_as::<_, PrivateFile>(&sql)
            .bind(user_id)
            .bind(file_hash)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))
    }

    /// Owner of the active file stored at `storage_path`, if any.
    pub async fn owner_of_path(&self, storage_path: &str) -> Result<Option<i64>> {
        sqlx::query_scalar(
            "SELECT user_id FROM private_files WHERE storage_path = ? AND status = 'active'",
        )
        .bind(storage_path)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| HostError::Database(e.to_string()))
    }

    /// Active files of a user, newest first.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<PrivateFile>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM private_files
             WHERE user_id = ? AND status = 'active'
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, PrivateFile>(&sql)
            .bind(user_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))
    }

    pub async fn increment_views(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE private_files SET views = views + 1 WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(())
    }

    /// Apply changes to an active row. Returns false if no active row matched.
    pub async fn update(&self, id: i64, changes: &PrivateFileChanges) -> Result<bool> {
        if changes.is_empty() {
            return Ok(self
                .get_by_id(id)
                .await?
                .is_some_and(|f| f.status == FileStatus::Active));
        }

        let mut query = QueryBuilder::new("UPDATE private_files SET ");
        let mut separated = query.separated(", ");

        if let Some(ref name) = changes.name {
            separated.push("name = ").push_bind_unseparated(name);
        }
        if let Some(ref state) = changes.encryption {
            separated
                .push("storage_path = ")
                .push_bind_unseparated(&state.storage_path);
            separated
                .push("is_encrypted = ")
                .push_bind_unseparated(state.secret_hash.is_some());
            separated
                .push("secret_hash = ")
                .push_bind_unseparated(&state.secret_hash);
        }
        separated
            .push("updated_at = ")
            .push_bind_unseparated(Utc::now());

        query.push(" WHERE id = ");
        query.push_bind(id);
        query.push(" AND status = 'active'");

        let result = query
            .build()
            .execute(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Soft-delete an active row owned by `user_id`.
    pub async fn soft_delete(&self, id: i64, user_id: i64) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE private_files SET status = 'deleted', deleted_at = ?, updated_at = ?
             WHERE id = ? AND user_id = ? AND status = 'active'",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(user_id)
        .execute(self.pool)
        .await
        .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}
