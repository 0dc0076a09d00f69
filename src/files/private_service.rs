//! Private file pipeline: upload, password-gated access and in-place
//! encryption changes.
//!
//! The row's `is_encrypted` flag, `secret_hash` and `storage_path` always
//! describe the file as it exists on disk. Every transform runs under the
//! file's hash lock, and if the row update after a transform fails the
//! transform is undone.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use super::mime_for;
use super::private_file::{
    EncryptionState, NewPrivateFile, PrivateFile, PrivateFileChanges, PrivateFileRepository,
};
use crate::auth::password::{hash_password, verify_file_secret};
use crate::config::StorageConfig;
use crate::db::DbPool;
use crate::storage::{archive, content_hash, policy, FileKind, FileStore, KeyedLocks, SaveOutcome};
use crate::{HostError, Result};

/// An upload as received from the client.
#[derive(Debug, Clone)]
pub struct PrivateUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
    /// MIME type supplied by the client; guessed from the extension if absent.
    pub mime_type: Option<String>,
    /// Encrypt the stored file with this password.
    pub password: Option<String>,
}

/// A change to a file's encryption state.
#[derive(Debug, Clone)]
pub enum EncryptionChange {
    Enable { password: String },
    Disable { password: String },
    ChangePassword { old: String, new: String },
}

/// The fields of a private file an owner may change.
#[derive(Debug, Clone, Default)]
pub struct PrivateFileUpdate {
    /// New display name, without extension.
    pub name: Option<String>,
    pub encryption: Option<EncryptionChange>,
}

fn lock_key(user_id: i64, hash: &str) -> String {
    format!("private:{user_id}:{hash}")
}

fn not_found() -> HostError {
    HostError::NotFound("private file".to_string())
}

fn non_empty(password: &str) -> Result<&str> {
    if password.is_empty() {
        return Err(HostError::InvalidInput("password must not be empty".to_string()));
    }
    Ok(password)
}

/// Private file operations over the database and the file store.
pub struct PrivateFileService<'a> {
    pool: &'a DbPool,
    store: &'a FileStore,
    locks: &'a KeyedLocks,
    config: &'a StorageConfig,
}

impl<'a> PrivateFileService<'a> {
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

    fn repo(&self) -> PrivateFileRepository<'a> {
        PrivateFileRepository::new(self.pool)
    }

    async fn owned(&self, id: i64, user_id: i64) -> Result<PrivateFile> {
        self.repo().get_active(id, user_id).await?.ok_or_else(not_found)
    }

    /// Upload a private file, optionally encrypting it.
    ///
    /// The same bytes uploaded twice by one owner fail with `AlreadyExists`.
    pub async fn upload(&self, user_id: i64, upload: PrivateUpload) -> Result<PrivateFile> {
        let size = upload.bytes.len() as u64;
        let ext = policy::validate(
            FileKind::Private,
            &upload.filename,
            size,
            self.config.max_private_bytes(),
        )?;
        let (name, _) = policy::sanitize_name(FileKind::Private, &upload.filename)?;
        let password = upload.password.as_deref().filter(|p| !p.is_empty());
        let hash = content_hash(&upload.bytes);

        let _guard = self.locks.lock(&lock_key(user_id, &hash)).await;
        let repo = self.repo();
        if repo.get_active_by_hash(user_id, &hash).await?.is_some() {
            return Err(HostError::AlreadyExists("private file".to_string()));
        }

        let plain_path = FileStore::private_path(user_id, &hash, &ext);
        let outcome = self.store.save(&plain_path, &upload.bytes)?;

        let (storage_path, secret_hash) = match password {
            None => (plain_path.clone(), None),
            Some(password) => match self.encrypt_new(&plain_path, password) {
                Ok(state) => state,
                Err(e) => {
                    if outcome == SaveOutcome::Written {
                        self.remove_quietly(&plain_path);
                    }
                    return Err(e);
                }
            },
        };

        let new_file = NewPrivateFile {
            user_id,
            name,
            file_hash: hash.clone(),
            size: size as i64,
            mime_type: mime_for(&ext, upload.mime_type.as_deref()),
            ext,
            storage_path: storage_path.clone(),
            secret_hash,
        };
        match repo.create(&new_file).await {
            Ok(file) => {
                info!(user_id, file_id = file.id, hash = %hash, encrypted = file.is_encrypted, "private file uploaded");
                Ok(file)
            }
            Err(e) => {
                self.remove_quietly(&storage_path);
                Err(e)
            }
        }
    }

    fn encrypt_new(&self, plain_path: &str, password: &str) -> Result<(String, Option<String>)> {
        let secret = hash_password(password)?;
        let archived = archive::encrypt_in_place(&self.store.resolve(plain_path)?, password)?;
        Ok((self.store.relativize(&archived)?, Some(secret)))
    }

    /// Get an owned file, checking the password of encrypted files.
    ///
    /// Counts the view. Encrypted files need the right password, otherwise
    /// `WrongPassword`.
    pub async fn get_file(
        &self,
        id: i64,
        user_id: i64,
        password: Option<&str>,
    ) -> Result<PrivateFile> {
        let file = self.owned(id, user_id).await?;
        if let Some(ref secret) = file.secret_hash {
            verify_file_secret(password, secret)?;
        }
        self.repo().increment_views(id).await?;
        Ok(file)
    }

    /// A readable plaintext of the file, for download.
    ///
    /// Unencrypted files are served from the store. Encrypted files are
    /// extracted into the temp directory and the returned copy is marked
    /// temporary. Runs under the file's hash lock so the row and the disk
    /// agree on which of the two it is.
    pub async fn decrypted_path(
        &self,
        id: i64,
        user_id: i64,
        password: Option<&str>,
    ) -> Result<DecryptedFile> {
        let file = self.owned(id, user_id).await?;
        let _guard = self.locks.lock(&lock_key(user_id, &file.file_hash)).await;
        let file = self.get_file(id, user_id, password).await?;

        let stored = self.store.resolve(&file.storage_path)?;
        if !file.is_encrypted {
            if !stored.is_file() {
                return Err(HostError::NotFound("stored file".to_string()));
            }
            return Ok(DecryptedFile {
                file,
                path: stored,
                temporary: false,
            });
        }
        let path = archive::extract_to(
            &stored,
            password.unwrap_or_default(),
            Path::new(&self.config.temp_path),
        )?;
        Ok(DecryptedFile {
            file,
            path,
            temporary: true,
        })
    }

    /// Files owned by a user.
    pub async fn list(&self, user_id: i64) -> Result<Vec<PrivateFile>> {
        self.repo().list_for_user(user_id).await
    }

    /// Rename a file and/or change its encryption.
    pub async fn update(
        &self,
        id: i64,
        user_id: i64,
        update: PrivateFileUpdate,
    ) -> Result<PrivateFile> {
        let file = self.owned(id, user_id).await?;
        let _guard = self.locks.lock(&lock_key(user_id, &file.file_hash)).await;
        // re-read under the lock
        let file = self.owned(id, user_id).await?;

        let name = match update.name {
            Some(name) => {
                let (name, _) = policy::sanitize_name(
                    FileKind::Private,
                    &format!("{}.{}", name.trim(), file.ext),
                )?;
                Some(name)
            }
            None => None,
        };

        let transform = match update.encryption {
            Some(change) => Some(self.apply_encryption(&file, &change)?),
            None => None,
        };

        let changes = PrivateFileChanges {
            name,
            encryption: transform.as_ref().map(|t| t.state.clone()),
        };
        let written = self.repo().update(id, &changes).await;
        match written {
            Ok(true) => {}
            Ok(false) => {
                if let Some(t) = transform {
                    self.revert(&file, t);
                }
                return Err(not_found());
            }
            Err(e) => {
                if let Some(t) = transform {
                    self.revert(&file, t);
                }
                return Err(e);
            }
        }

        info!(user_id, file_id = id, "private file updated");
        self.owned(id, user_id).await
    }

    fn apply_encryption(&self, file: &PrivateFile, change: &EncryptionChange) -> Result<Transform> {
        let current = self.store.resolve(&file.storage_path)?;
        match change {
            EncryptionChange::Enable { password } => {
                if file.is_encrypted {
                    return Err(HostError::InvalidInput("file is already encrypted".to_string()));
                }
                let password = non_empty(password)?;
                let secret = hash_password(password)?;
                let archived = archive::encrypt_in_place(&current, password)?;
                Ok(Transform {
                    state: EncryptionState {
                        storage_path: self.store.relativize(&archived)?,
                        secret_hash: Some(secret),
                    },
                    undo: Undo::Decrypt(password.to_string()),
                })
            }
            EncryptionChange::Disable { password } => {
                let secret = file.secret_hash.as_deref().ok_or_else(|| {
                    HostError::InvalidInput("file is not encrypted".to_string())
                })?;
                verify_file_secret(Some(password.as_str()), secret)?;
                let plain = archive::decrypt_in_place(&current, password)?;
                Ok(Transform {
                    state: EncryptionState {
                        storage_path: self.store.relativize(&plain)?,
                        secret_hash: None,
                    },
                    undo: Undo::Encrypt(password.clone()),
                })
            }
            EncryptionChange::ChangePassword { old, new } => {
                let secret = file.secret_hash.as_deref().ok_or_else(|| {
                    HostError::InvalidInput("file is not encrypted".to_string())
                })?;
                verify_file_secret(Some(old.as_str()), secret)?;
                let new = non_empty(new)?;
                let new_secret = hash_password(new)?;
                archive::rewrap(&current, old, new)?;
                Ok(Transform {
                    state: EncryptionState {
                        storage_path: file.storage_path.clone(),
                        secret_hash: Some(new_secret),
                    },
                    undo: Undo::Rewrap {
                        from: new.to_string(),
                        to: old.clone(),
                    },
                })
            }
        }
    }

    fn revert(&self, file: &PrivateFile, transform: Transform) {
        let result = self.store.resolve(&transform.state.storage_path).and_then(|path| {
            let reverted = match transform.undo {
                Undo::Decrypt(password) => archive::decrypt_in_place(&path, &password).map(|_| ()),
                Undo::Encrypt(password) => archive::encrypt_in_place(&path, &password).map(|_| ()),
                Undo::Rewrap { from, to } => archive::rewrap(&path, &from, &to),
            };
            reverted.map_err(HostError::from)
        });
        match result {
            Ok(()) => warn!(file_id = file.id, "encryption change reverted"),
            Err(e) => error!(
                file_id = file.id,
                path = %file.storage_path,
                error = %e,
                "failed to revert encryption change"
            ),
        }
    }

    /// Soft-delete an owned file and remove it from disk.
    pub async fn delete(&self, id: i64, user_id: i64) -> Result<()> {
        let file = self.owned(id, user_id).await?;
        let _guard = self.locks.lock(&lock_key(user_id, &file.file_hash)).await;

        let repo = self.repo();
        let file = repo.get_active(id, user_id).await?.ok_or_else(not_found)?;
        if !repo.soft_delete(id, user_id).await? {
            return Err(not_found());
        }
        self.store.delete(&file.storage_path)?;
        info!(user_id, file_id = id, "private file deleted");
        Ok(())
    }

    fn remove_quietly(&self, path: &str) {
        if let Err(e) = self.store.delete(path) {
            warn!(path, error = %e, "cleanup after failed upload failed");
        }
    }
}

/// Plaintext of a private file ready to be read.
#[derive(Debug)]
pub struct DecryptedFile {
    /// The row as it was when the plaintext was produced.
    pub file: PrivateFile,
    pub path: PathBuf,
    /// `path` is a copy in the temp directory rather than the stored file.
    pub temporary: bool,
}

impl DecryptedFile {
    /// Remove the copy if it is temporary. The stored file is never touched.
    pub async fn discard(&self) {
        if !self.temporary {
            return;
        }
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            warn!(path = %self.path.display(), error = %e, "failed to remove decrypted copy");
        }
    }

    /// Read the plaintext, then discard the copy whether or not the read worked.
    pub async fn into_content(self) -> Result<(PrivateFile, Vec<u8>)> {
        let read = tokio::fs::read(&self.path).await;
        self.discard().await;
        match read {
            Ok(content) => Ok((self.file, content)),
            Err(e) => Err(HostError::Storage(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }
}

/// An applied encryption transform and how to undo it.
struct Transform {
    state: EncryptionState,
    undo: Undo,
}

enum Undo {
    Decrypt(String),
    Encrypt(String),
    Rewrap { from: String, to: String },
}
