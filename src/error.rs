//! Error types for imghost.

use thiserror::Error;

/// Common error type for imghost.
///
/// Each variant corresponds to one error kind surfaced to callers; the HTTP
/// layer picks the status code from the variant alone.
#[derive(Error, Debug)]
pub enum HostError {
    /// Malformed request data or unparseable identifiers.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Filename, extension or size policy violation.
    #[error("validation error: {0}")]
    Validation(String),

    /// The content (or named entity) already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Missing, invalid, expired or revoked credential.
    #[error("authentication error: {0}")]
    Unauthenticated(String),

    /// Authenticated, but a required permission is missing.
    #[error("permission denied: missing {permission}")]
    PermissionDenied {
        /// Name of the first permission the caller lacks.
        permission: String,
    },

    /// Resource not found (or not owned by the caller).
    #[error("{0} not found")]
    NotFound(String),

    /// Disk I/O failure while saving, deleting or transforming a file.
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An encrypted file was opened with the wrong password.
    #[error("wrong password")]
    WrongPassword,

    /// Database error.
    ///
    /// Database errors from sqlx are automatically converted.
    #[error("database error: {0}")]
    Database(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Password hashing failed for reasons other than a mismatch.
    #[error("credential error: {0}")]
    Credential(String),
}

impl HostError {
    /// Shorthand for a permission denial naming the missing permission.
    pub fn permission_denied(permission: impl Into<String>) -> Self {
        HostError::PermissionDenied {
            permission: permission.into(),
        }
    }

    /// Whether this error came from the disk rather than from the caller.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, HostError::Storage(_) | HostError::Io(_))
    }
}

// Conversion from sqlx errors
impl From<sqlx::Error> for HostError {
    fn from(e: sqlx::Error) -> Self {
        HostError::Database(e.to_string())
    }
}

/// Result type alias for imghost operations.
pub type Result<T> = std::result::Result<T, HostError>;
