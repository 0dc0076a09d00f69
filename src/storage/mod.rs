//! Content-addressed file storage.
//!
//! - [`hash`]: content hashes used as storage keys
//! - [`policy`]: extension, size and name rules for uploads
//! - [`store`]: hash-derived paths with atomic writes
//! - [`thumbnail`]: resized image derivatives
//! - [`archive`]: in-place password-protected archives

pub mod archive;
pub mod hash;
mod locks;
pub mod policy;
mod store;
pub mod thumbnail;

pub use archive::{ArchiveError, ARCHIVE_SUFFIX};
pub use hash::{content_hash, sha256_hex};
pub use locks::KeyedLocks;
pub use policy::FileKind;
pub use store::{FileStore, SaveOutcome};
