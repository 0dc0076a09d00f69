//! Content addressing.

use sha2::{Digest, Sha256};

/// Length in hex characters of every content hash (128 bits).
pub const CONTENT_HASH_LEN: usize = 32;

/// Full lowercase hex SHA-256 digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Content hash used for deduplication and storage paths.
///
/// The SHA-256 digest truncated to [`CONTENT_HASH_LEN`] hex characters.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hex = sha256_hex(bytes);
    hex.truncate(CONTENT_HASH_LEN);
    hex
}

/// Whether `s` looks like a value produced by [`content_hash`].
pub fn is_content_hash(s: &str) -> bool {
    s.len() == CONTENT_HASH_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
