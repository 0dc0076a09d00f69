//! Image upload pipeline.

use tracing::{info, warn};

use super::image::{Image, ImageRepository, NewImage};
use super::mime_for;
use crate::config::StorageConfig;
use crate::db::DbPool;
use crate::storage::{content_hash, policy, thumbnail, FileKind, FileStore, KeyedLocks, SaveOutcome};
use crate::{HostError, Result};

/// An upload as received from the client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub description: String,
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub image: Image,
    /// Public URL of the original.
    pub url: String,
}

/// Image operations over the database and the file store.
pub struct ImageService<'a> {
    pool: &'a DbPool,
    store: &'a FileStore,
    locks: &'a KeyedLocks,
    config: &'a StorageConfig,
}

fn lock_key(hash: &str) -> String {
    format!("image:{hash}")
}

impl<'a> ImageService<'a> {
    pub fn new(
        pool: &'a DbPool,
        store: &'a FileStore,
        locks: &'a KeyedLocks,
        config: &'a StorageConfig,
    ) -> Self {
        Self {
            pool,
            store,
            locks,
            config,
        }
    }

    /// Public URL of an image.
    pub fn url_for(&self, image: &Image) -> String {
        format!(
            "{}{}.{}",
            self.config.image_url_prefix, image.file_hash, image.ext
        )
    }

    /// Upload an image.
    ///
    /// Identical bytes already uploaded by anyone fail with `AlreadyExists`.
    /// Thumbnail generation is best effort.
    pub async fn upload(&self, user_id: i64, upload: ImageUpload) -> Result<UploadedImage> {
        let size = upload.bytes.len() as u64;
        let ext = policy::validate(
            FileKind::Image,
            &upload.filename,
            size,
            self.config.max_image_bytes(),
        )?;
        let (name, _) = policy::sanitize_name(FileKind::Image, &upload.filename)?;
        let hash = content_hash(&upload.bytes);

        let _guard = self.locks.lock(&lock_key(&hash)).await;
        let repo = ImageRepository::new(self.pool);
        if repo.get_by_hash(&hash).await?.is_some() {
            return Err(HostError::AlreadyExists("image".to_string()));
        }

        let storage_path = FileStore::image_path(&hash, &ext);
        let outcome = self.store.save(&storage_path, &upload.bytes)?;

        let thumbnail_path = match thumbnail::generate(
            self.store,
            &upload.bytes,
            &hash,
            self.config.thumbnail_width,
        ) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(hash = %hash, error = %e, "thumbnail generation skipped");
                None
            }
        };

        let new_image = NewImage {
            user_id,
            name,
            description: upload.description.trim().to_string(),
            file_hash: hash.clone(),
            size: size as i64,
            mime_type: mime_for(&ext, None),
            ext,
            storage_path: storage_path.clone(),
            thumbnail_path: thumbnail_path.clone(),
        };

        let image = match repo.create(&new_image).await {
            Ok(image) => image,
            Err(e) => {
                if outcome == SaveOutcome::Written {
                    self.remove_quietly(&storage_path);
                }
                if let Some(ref thumb) = thumbnail_path {
                    self.remove_quietly(thumb);
                }
                return Err(e);
            }
        };

        info!(user_id, image_id = image.id, hash = %hash, "image uploaded");
        let url = self.url_for(&image);
        Ok(UploadedImage { image, url })
    }

    /// Get an image by ID and count the view.
    pub async fn get(&self, id: i64) -> Result<Image> {
        let repo = ImageRepository::new(self.pool);
        let image = repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| HostError::NotFound("image".to_string()))?;
        repo.increment_views(id).await?;
        Ok(image)
    }

    /// Images uploaded by a user.
    pub async fn list(&self, user_id: i64) -> Result<Vec<Image>> {
        ImageRepository::new(self.pool).list_for_user(user_id).await
    }

    /// Delete an image owned by `user_id`, its original and its thumbnail.
    pub async fn delete(&self, id: i64, user_id: i64) -> Result<()> {
        let repo = ImageRepository::new(self.pool);
        let image = repo
            .get_by_id(id)
            .await?
            .filter(|i| i.user_id == user_id)
            .ok_or_else(|| HostError::NotFound("image".to_string()))?;

        let _guard = self.locks.lock(&lock_key(&image.file_hash)).await;
        if !repo.delete(id, user_id).await? {
            return Err(HostError::NotFound("image".to_string()));
        }

        self.store.delete(&image.storage_path)?;
        if let Some(ref thumb) = image.thumbnail_path {
            self.store.delete(thumb)?;
        }
        info!(user_id, image_id = id, "image deleted");
        Ok(())
    }

    fn remove_quietly(&self, path: &str) {
        if let Err(e) = self.store.delete(path) {
            warn!(path, error = %e, "cleanup after failed upload failed");
        }
    }
}
