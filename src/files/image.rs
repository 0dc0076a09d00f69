//! Public image records.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{is_unique_violation, DbPool};
use crate::{HostError, Result};

/// A public image, deduplicated globally by content hash.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Image {
    pub id: i64,
    /// Uploader.
    pub user_id: i64,
    /// Display name without extension.
    pub name: String,
    pub description: String,
    pub file_hash: String,
    pub size: i64,
    /// Lowercase extension without the dot.
    pub ext: String,
    pub mime_type: String,
    /// Path relative to the store root.
    pub storage_path: String,
    /// Thumbnail path relative to the store root, if one was generated.
    pub thumbnail_path: Option<String>,
    pub views: i64,
    pub created_at: DateTime<Utc>,
}

/// Data for inserting an image row.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub user_id: i64,
    pub name: String,
    pub description: String,
    pub file_hash: String,
    pub size: i64,
    pub ext: String,
    pub mime_type: String,
    pub storage_path: String,
    pub thumbnail_path: Option<String>,
}

const IMAGE_COLUMNS: &str = "id, user_id, name, description, file_hash, size, ext, mime_type, \
     storage_path, thumbnail_path, views, created_at";

/// Repository for image rows.
pub struct ImageRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ImageRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert an image row.
    ///
    /// A second row for the same content hash fails with `AlreadyExists`.
    pub async fn create(&self, new_image: &NewImage) -> Result<Image> {
        let result = sqlx::query(
            "INSERT INTO images
                (user_id, name, description, file_hash, size, ext, mime_type,
                 storage_path, thumbnail_path, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new_image.user_id)
        .bind(&new_image.name)
        .bind(&new_image.description)
        .bind(&new_image.file_hash)
        .bind(new_image.size)
        .bind(&new_image.ext)
        .bind(&new_image.mime_type)
        .bind(&new_image.storage_path)
        .bind(&new_image.thumbnail_path)
        .bind(Utc::now())
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                HostError::AlreadyExists("image".to_string())
            } else {
                HostError::Database(e.to_string())
            }
        })?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| HostError::NotFound("image".to_string()))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Image>> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = ?");
        sqlx::query_as::<_, Image>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))
    }

    pub async fn get_by_hash(&self, file_hash: &str) -> Result<Option<Image>> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE file_hash = ?");
        sqlx::query_as::<_, Image>(&sql)
            .bind(file_hash)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))
    }

    /// Images uploaded by a user, newest first.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Image>> {
        let sql = format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE user_id = ? ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Image>(&sql)
            .bind(user_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))
    }

    pub async fn increment_views(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE images SET views = views + 1 WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(())
    }

    /// Delete an image row owned by `user_id`. Returns false if none matched.
    pub async fn delete(&self, id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM images WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}
