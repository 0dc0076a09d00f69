//! Uploaded files: public images, their tags, and private files.
//!
//! Records live in the database; bytes live in the
//! [`FileStore`](crate::storage::FileStore) under content-derived paths.

mod image;
mod image_service;
mod private_file;
mod private_service;
mod tag;
mod tag_service;

pub use image::{Image, ImageRepository, NewImage};
pub use image_service::{ImageService, ImageUpload, UploadedImage};
pub use private_file::{
    EncryptionState, FileStatus, NewPrivateFile, PrivateFile, PrivateFileChanges,
    PrivateFileRepository,
};
pub use private_service::{
    DecryptedFile, EncryptionChange, PrivateFileService, PrivateFileUpdate, PrivateUpload,
};
pub use tag::{normalize_tag_name, Tag, TagRepository, MAX_TAG_NAME_CHARS};
pub use tag_service::TagService;

/// MIME type for a stored file.
///
/// A non-empty type supplied by the client wins; otherwise it is guessed
/// from the extension.
pub fn mime_for(ext: &str, supplied: Option<&str>) -> String {
    match supplied.map(str::trim).filter(|m| !m.is_empty()) {
        Some(mime) => mime.to_string(),
        None => mime_guess::from_ext(ext)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for("png", None), "image/png");
        assert_eq!(mime_for("pdf", None), "application/pdf");
        assert_eq!(mime_for("txt", Some("  ")), "text/plain");
        assert_eq!(mime_for("txt", Some("text/markdown")), "text/markdown");
        assert_eq!(mime_for("unknownext", None), "application/octet-stream");
    }
}
