//! Content-addressed file store.
//!
//! Every stored file lives at a path derived from its content hash:
//!
//! ```text
//! {root}/
//! ├── images/<hash>.<ext>
//! ├── thumbnails/<hash>.webp            (or .png)
//! └── private/user_<id>/<hash>.<ext>[.zip]
//! ```
//!
//! Paths handed to callers and stored in the database are relative to the
//! root, with `/` separators.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, error};
use uuid::Uuid;

use super::hash::content_hash;
use crate::{HostError, Result};

/// Outcome of [`FileStore::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The bytes were written.
    Written,
    /// An identical file was already at the path (left behind by an
    /// interrupted upload) and has been adopted.
    Adopted,
}

/// Physical storage for uploaded files.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative path of a public image.
    pub fn image_path(hash: &str, ext: &str) -> String {
        format!("images/{hash}.{ext}")
    }

    /// Relative path of an image thumbnail without extension.
    pub fn thumbnail_stem(hash: &str) -> String {
        format!("thumbnails/{hash}")
    }

    /// Relative path of a private file in plaintext form.
    pub fn private_path(user_id: i64, hash: &str, ext: &str) -> String {
        format!("private/user_{user_id}/{hash}.{ext}")
    }

    /// Absolute path for a relative store path.
    ///
    /// Rejects absolute paths and any `..` component.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let rel = Path::new(relative);
        let safe = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if relative.is_empty() || !safe {
            return Err(HostError::InvalidInput(format!(
                "invalid storage path '{relative}'"
            )));
        }
        Ok(self.root.join(rel))
    }

    /// Relative form of an absolute path inside the store.
    pub fn relativize(&self, absolute: &Path) -> Result<String> {
        let rel = absolute.strip_prefix(&self.root).map_err(|_| {
            HostError::Storage(format!("{} is outside the store", absolute.display()))
        })?;
        let parts: Vec<_> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();
        Ok(parts.join("/"))
    }

    /// Normalize a path requested through the proxy into a store path.
    ///
    /// Accepts `/private/user_1/x.pdf`, `private/user_1/x.pdf`, or the same
    /// prefixed with the store root as configured.
    pub fn normalize_request_path(&self, requested: &str) -> String {
        let requested = requested.split(['?', '#']).next().unwrap_or("");
        let trimmed = requested.trim_start_matches('/');
        let root = self.root.to_string_lossy();
        let root = root.trim_start_matches("./").trim_matches('/');
        let stripped = if root.is_empty() {
            trimmed
        } else {
            trimmed
                .strip_prefix(root)
                .map(|rest| rest.trim_start_matches('/'))
                .unwrap_or(trimmed)
        };
        stripped.to_string()
    }

    /// Write `bytes` to `relative`, never replacing a different file.
    ///
    /// The data goes to a temporary sibling first and is renamed into
    /// place, so readers never observe a partial file. If a file already
    /// exists at the path with the same content hash it is adopted;
    /// different content is an error. Callers serialize saves per hash.
    pub fn save(&self, relative: &str, bytes: &[u8]) -> Result<SaveOutcome> {
        let path = self.resolve(relative)?;

        if path.exists() {
            let existing = fs::read(&path).map_err(|e| storage_error("read", &path, e))?;
            if content_hash(&existing) == content_hash(bytes) {
                debug!(path = %path.display(), "adopting existing identical file");
                return Ok(SaveOutcome::Adopted);
            }
            return Err(HostError::Storage(format!(
                "refusing to overwrite different file at {}",
                path.display()
            )));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| storage_error("create dir", parent, e))?;
        }

        let tmp = temp_sibling(&path);
        let written = (|| -> io::Result<()> {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(storage_error("write", &path, e));
        }
        Ok(SaveOutcome::Written)
    }

    /// Read a stored file.
    pub fn read(&self, relative: &str) -> Result<Vec<u8>> {
        let path = self.resolve(relative)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(HostError::NotFound(format!("stored file {relative}")))
            }
            Err(e) => Err(storage_error("read", &path, e)),
        }
    }

    /// Delete a stored file.
    ///
    /// Returns `true` if the file was deleted, `false` if it was already gone.
    pub fn delete(&self, relative: &str) -> Result<bool> {
        let path = self.resolve(relative)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_error("delete", &path, e)),
        }
    }

    /// Check if a stored file exists.
    pub fn exists(&self, relative: &str) -> bool {
        self.resolve(relative).map(|p| p.is_file()).unwrap_or(false)
    }
}

/// Unique temporary name next to `path`.
pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
}

pub(crate) fn storage_error(op: &str, path: &Path, e: io::Error) -> HostError {
    error!(op, path = %path.display(), error = %e, "storage failure");
    HostError::Storage(format!("{op} {}: {e}", path.display()))
}
