//! Upload policy: allowed extensions, size ceilings and display names.

use std::path::Path;

use crate::{HostError, Result};

/// The two kinds of stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Public image, deduplicated globally.
    Image,
    /// Private file, deduplicated per owner.
    Private,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

const PRIVATE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "pdf", "doc", "docx", "xls", "xlsx", "txt",
];

/// Maximum display name length for images, in characters.
pub const MAX_IMAGE_NAME_CHARS: usize = 20;

/// Maximum display name length for private files, in characters.
pub const MAX_PRIVATE_NAME_CHARS: usize = 100;

impl FileKind {
    /// Lowercase extensions (without the dot) accepted for this kind.
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            FileKind::Image => IMAGE_EXTENSIONS,
            FileKind::Private => PRIVATE_EXTENSIONS,
        }
    }

    fn max_name_chars(&self) -> usize {
        match self {
            FileKind::Image => MAX_IMAGE_NAME_CHARS,
            FileKind::Private => MAX_PRIVATE_NAME_CHARS,
        }
    }

    fn allows_char(&self, c: char) -> bool {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            return true;
        }
        match self {
            FileKind::Image => is_han(c),
            FileKind::Private => c.is_alphanumeric(),
        }
    }
}

fn is_han(c: char) -> bool {
    matches!(c, '\u{3400}'..='\u{4DBF}' | '\u{4E00}'..='\u{9FFF}' | '\u{F900}'..='\u{FAFF}')
}

/// Lowercase extension of `filename` without the dot, if any.
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_ascii_lowercase())
}

/// Check extension and size. Returns the normalized lowercase extension.
pub fn validate(kind: FileKind, filename: &str, size: u64, max_size: u64) -> Result<String> {
    let ext = extension_of(filename)
        .ok_or_else(|| HostError::Validation(format!("'{filename}' has no extension")))?;

    if !kind.allowed_extensions().contains(&ext.as_str()) {
        return Err(HostError::Validation(format!(
            "extension '.{ext}' is not allowed (allowed: {})",
            kind.allowed_extensions().join(", ")
        )));
    }
    if size == 0 {
        return Err(HostError::Validation("file is empty".to_string()));
    }
    if size > max_size {
        return Err(HostError::Validation(format!(
            "file too large: {size} bytes (max {max_size})"
        )));
    }
    Ok(ext)
}

/// Split `filename` into a checked display name and its lowercase extension.
///
/// Only the final path component is considered. The name may contain
/// letters, digits, `_` and `-` (plus Han characters for images and any
/// Unicode letter for private files).
pub fn sanitize_name(kind: FileKind, filename: &str) -> Result<(String, String)> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let ext = extension_of(base).unwrap_or_default();
    let stem = if ext.is_empty() {
        base
    } else {
        &base[..base.len() - ext.len() - 1]
    };

    if stem.is_empty() {
        return Err(HostError::Validation("file name is empty".to_string()));
    }
    let chars = stem.chars().count();
    if chars > kind.max_name_chars() {
        return Err(HostError::Validation(format!(
            "file name too long: {chars} characters (max {})",
            kind.max_name_chars()
        )));
    }
    if let Some(bad) = stem.chars().find(|c| !kind.allows_char(*c)) {
        return Err(HostError::Validation(format!(
            "file name contains invalid character '{bad}'"
        )));
    }
    Ok((stem.to_string(), ext))
}
