//! Image tags.
//!
//! Tags belong to a user; names are unique per owner, ignoring case. An
//! image carries any number of its uploader's tags.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{is_unique_violation, DbPool};
use crate::{HostError, Result};

/// Longest accepted tag name, in characters.
pub const MAX_TAG_NAME_CHARS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

const TAG_COLUMNS: &str = "id, user_id, name, created_at";

/// Trim and check a tag name.
pub fn normalize_tag_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(HostError::InvalidInput("tag name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_TAG_NAME_CHARS {
        return Err(HostError::InvalidInput(format!(
            "tag name longer than {MAX_TAG_NAME_CHARS} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(HostError::InvalidInput(
            "tag name contains control characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

/// Repository for tags and image-tag links.
pub struct TagRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> TagRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a tag. A name the owner already uses fails with `AlreadyExists`.
    pub async fn create(&self, user_id: i64, name: &str) -> Result<Tag> {
        let result = sqlx::query("INSERT INTO tags (user_id, name, created_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(name)
            .bind(Utc::now())
            .execute(self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    HostError::AlreadyExists(format!("tag '{name}'"))
                } else {
                    HostError::Database(e.to_string())
                }
            })?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| HostError::NotFound("tag".to_string()))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        let sql = format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = ?");
        sqlx::query_as::<_, Tag>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))
    }

    /// A user's tags by name.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Tag>> {
        let sql = format!(
            "SELECT {TAG_COLUMNS} FROM tags WHERE user_id = ? ORDER BY name COLLATE NOCASE"
        );
        sqlx::query_as::<_, Tag>(&sql)
            .bind(user_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))
    }

    /// Tags on an image by name.
    pub async fn tags_of_image(&self, image_id: i64) -> Result<Vec<Tag>> {
        sqlx::query_as::<_, Tag>(
            "SELECT t.id, t.user_id, t.name, t.created_at
             FROM tags t
             JOIN image_tags it ON it.tag_id = t.id
             WHERE it.image_id = ?
             ORDER BY t.name COLLATE NOCASE",
        )
        .bind(image_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| HostError::Database(e.to_string()))
    }

    /// Link a tag to an image. Returns false if already linked.
    pub async fn link(&self, image_id: i64, tag_id: i64) -> Result<bool> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO image_tags (image_id, tag_id) VALUES (?, ?)")
                .bind(image_id)
                .bind(tag_id)
                .execute(self.pool)
                .await
                .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a link. Returns false if there was none.
    pub async fn unlink(&self, image_id: i64, tag_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM image_tags WHERE image_id = ? AND tag_id = ?")
            .bind(image_id)
            .bind(tag_id)
            .execute(self.pool)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}
