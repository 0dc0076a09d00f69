//! Tagging of a user's own images.

use chrono::Utc;
use tracing::info;

use super::image::{Image, ImageRepository};
use super::tag::{normalize_tag_name, Tag, TagRepository};
use crate::db::DbPool;
use crate::{HostError, Result};

fn image_not_found() -> HostError {
    HostError::NotFound("image".to_string())
}

/// Tag operations, scoped to the caller.
pub struct TagService<'a> {
    pool: &'a DbPool,
}

impl<'a> TagService<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    fn repo(&self) -> TagRepository<'a> {
        TagRepository::new(self.pool)
    }

    /// An image uploaded by `user_id`. Other users' images are `NotFound`.
    async fn owned_image(&self, image_id: i64, user_id: i64) -> Result<Image> {
        ImageRepository::new(self.pool)
            .get_by_id(image_id)
            .await?
            .filter(|i| i.user_id == user_id)
            .ok_or_else(image_not_found)
    }

    async fn owned_tag(&self, tag_id: i64, user_id: i64) -> Result<Tag> {
        self.repo()
            .get_by_id(tag_id)
            .await?
            .filter(|t| t.user_id == user_id)
            .ok_or_else(|| HostError::NotFound("tag".to_string()))
    }

    /// Create a tag for `user_id`.
    pub async fn create_tag(&self, user_id: i64, name: &str) -> Result<Tag> {
        let name = normalize_tag_name(name)?;
        let tag = self.repo().create(user_id, &name).await?;
        info!(user_id, tag_id = tag.id, "tag created");
        Ok(tag)
    }

    /// The caller's tags.
    pub async fn list_tags(&self, user_id: i64) -> Result<Vec<Tag>> {
        self.repo().list_for_user(user_id).await
    }

    /// Tags on an image. Any caller allowed to view the image may list them.
    pub async fn image_tags(&self, image_id: i64) -> Result<Vec<Tag>> {
        ImageRepository::new(self.pool)
            .get_by_id(image_id)
            .await?
            .ok_or_else(image_not_found)?;
        self.repo().tags_of_image(image_id).await
    }

    /// Put one of the caller's existing tags on one of their images.
    ///
    /// Returns false if the image already carried it.
    pub async fn add_tag_to_image(
        &self,
        user_id: i64,
        image_id: i64,
        tag_id: i64,
    ) -> Result<bool> {
        self.owned_image(image_id, user_id).await?;
        self.owned_tag(tag_id, user_id).await?;
        self.repo().link(image_id, tag_id).await
    }

    /// Take a tag off one of the caller's images.
    pub async fn remove_tag_from_image(
        &self,
        user_id: i64,
        image_id: i64,
        tag_id: i64,
    ) -> Result<()> {
        self.owned_image(image_id, user_id).await?;
        self.owned_tag(tag_id, user_id).await?;
        if !self.repo().unlink(image_id, tag_id).await? {
            return Err(HostError::NotFound("tag on image".to_string()));
        }
        Ok(())
    }

    /// Tag one of the caller's images by name.
    ///
    /// Missing tags are created. Creation and linking happen in one
    /// transaction; links the image already has are kept. Returns the
    /// image's tags afterwards.
    pub async fn tag_image(
        &self,
        user_id: i64,
        image_id: i64,
        names: &[String],
    ) -> Result<Vec<Tag>> {
        self.owned_image(image_id, user_id).await?;

        let mut wanted: Vec<String> = Vec::with_capacity(names.len());
        for raw in names {
            let name = normalize_tag_name(raw)?;
            if !wanted.iter().any(|w| w.to_lowercase() == name.to_lowercase()) {
                wanted.push(name);
            }
        }
        if wanted.is_empty() {
            return Err(HostError::InvalidInput("no tags given".to_string()));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;
        let mut linked = 0u64;
        for name in &wanted {
            sqlx::query("INSERT OR IGNORE INTO tags (user_id, name, created_at) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(name)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .map_err(|e| HostError::Database(e.to_string()))?;

            let tag_id: i64 = sqlx::query_scalar(
                "SELECT id FROM tags WHERE user_id = ? AND name = ? COLLATE NOCASE",
            )
            .bind(user_id)
            .bind(name)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;

            linked += sqlx::query(
                "INSERT OR IGNORE INTO image_tags (image_id, tag_id) VALUES (?, ?)",
            )
            .bind(image_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?
            .rows_affected();
        }
        tx.commit()
            .await
            .map_err(|e| HostError::Database(e.to_string()))?;

        info!(user_id, image_id, linked, "image tagged");
        self.repo().tags_of_image(image_id).await
    }
}
