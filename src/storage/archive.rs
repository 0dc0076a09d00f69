//! Password-protected single-entry archives.
//!
//! Encrypted files are stored as standard ZIP archives holding one entry
//! encrypted with WinZip AES-256, so any ZIP tool that knows the password
//! can recover the plaintext. The archive path is the plaintext path plus
//! [`ARCHIVE_SUFFIX`].
//!
//! All transforms write a temporary sibling, sync it and rename it into
//! place before removing the previous representation. A failure at any
//! point leaves the previous representation untouched.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{AesMode, CompressionMethod, ZipArchive, ZipWriter};

use super::store::temp_sibling;
use crate::HostError;

/// Suffix appended to the path of an encrypted file.
pub const ARCHIVE_SUFFIX: &str = ".zip";

/// Archive operation failures.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The password does not open the archive.
    #[error("wrong password")]
    WrongPassword,

    /// The file to transform does not exist.
    #[error("file not found: {0}")]
    Missing(PathBuf),

    /// The archive could not be parsed or has no entry.
    #[error("corrupt archive {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Path without the archive suffix given to an unwrap operation.
    #[error("not an archive path: {0}")]
    NotAnArchive(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<ArchiveError> for HostError {
    fn from(e: ArchiveError) -> Self {
        match e {
            ArchiveError::WrongPassword => HostError::WrongPassword,
            ArchiveError::Missing(_) => HostError::NotFound("stored file".to_string()),
            other => HostError::Storage(other.to_string()),
        }
    }
}

type Result<T> = std::result::Result<T, ArchiveError>;

/// Path of the archive that wraps `plain`.
pub fn archive_path(plain: &Path) -> PathBuf {
    let mut s = plain.as_os_str().to_owned();
    s.push(ARCHIVE_SUFFIX);
    PathBuf::from(s)
}

/// Path of the plaintext wrapped by `archive`, if it carries the suffix.
pub fn plain_path(archive: &Path) -> Option<PathBuf> {
    archive
        .to_str()
        .and_then(|s| s.strip_suffix(ARCHIVE_SUFFIX))
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

/// Whether a (relative or absolute) path names an archive.
pub fn is_archive_path(path: &str) -> bool {
    path.ends_with(ARCHIVE_SUFFIX)
}

fn read_source(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ArchiveError::Missing(path.to_path_buf()),
        _ => ArchiveError::Io(e),
    })
}

fn entry_name(plain: &Path) -> String {
    plain
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}

/// Write `bytes` to a temporary sibling of `dest` and rename it into place.
fn write_atomically(dest: &Path, fill: impl FnOnce(File) -> Result<File>) -> Result<()> {
    let tmp = temp_sibling(dest);
    let result = File::create(&tmp)
        .map_err(ArchiveError::from)
        .and_then(fill)
        .and_then(|file| file.sync_all().map_err(ArchiveError::from))
        .and_then(|_| fs::rename(&tmp, dest).map_err(ArchiveError::from));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_archive(dest: &Path, entry: &str, bytes: &[u8], password: &str) -> Result<()> {
    write_atomically(dest, |file| {
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .with_aes_encryption(AesMode::Aes256, password);
        zip.start_file(entry, options).map_err(|e| corrupt(dest, e))?;
        zip.write_all(bytes)?;
        zip.finish().map_err(|e| corrupt(dest, e))
    })
}

fn corrupt(path: &Path, e: impl std::fmt::Display) -> ArchiveError {
    ArchiveError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Read the single entry of `archive` with `password`.
///
/// Returns the entry name and plaintext.
pub fn read_entry(archive: &Path, password: &str) -> Result<(String, Vec<u8>)> {
    let file = File::open(archive).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ArchiveError::Missing(archive.to_path_buf()),
        _ => ArchiveError::Io(e),
    })?;
    let mut zip = ZipArchive::new(file).map_err(|e| corrupt(archive, e))?;
    if zip.is_empty() {
        return Err(corrupt(archive, "archive has no entries"));
    }

    let mut entry = match zip.by_index_decrypt(0, password.as_bytes()) {
        Ok(entry) => entry,
        Err(ZipError::InvalidPassword) => return Err(ArchiveError::WrongPassword),
        Err(ZipError::Io(e)) => return Err(ArchiveError::Io(e)),
        Err(e) => return Err(corrupt(archive, e)),
    };
    let name = entry.name().to_string();
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    // a password passing the quick check but failing authentication surfaces here
    entry
        .read_to_end(&mut bytes)
        .map_err(|e| corrupt(archive, e))?;
    Ok((name, bytes))
}

/// Replace the file at `plain` with a password-protected archive.
///
/// Returns the archive path. The plaintext is removed only after the
/// archive has been written and renamed into place.
pub fn encrypt_in_place(plain: &Path, password: &str) -> Result<PathBuf> {
    let bytes = read_source(plain)?;
    let dest = archive_path(plain);
    write_archive(&dest, &entry_name(plain), &bytes, password)?;

    if let Err(e) = fs::remove_file(plain) {
        // keep the old representation rather than end up with two
        let _ = fs::remove_file(&dest);
        return Err(ArchiveError::Io(e));
    }
    debug!(path = %dest.display(), "file encrypted");
    Ok(dest)
}

/// Replace the archive at `archive` with its plaintext.
///
/// Returns the plaintext path. A wrong password fails with
/// [`ArchiveError::WrongPassword`] and leaves the archive untouched.
pub fn decrypt_in_place(archive: &Path, password: &str) -> Result<PathBuf> {
    let dest = plain_path(archive).ok_or_else(|| ArchiveError::NotAnArchive(archive.into()))?;
    let (_, bytes) = read_entry(archive, password)?;

    write_atomically(&dest, |mut file| {
        file.write_all(&bytes)?;
        Ok(file)
    })?;

    if let Err(e) = fs::remove_file(archive) {
        let _ = fs::remove_file(&dest);
        return Err(ArchiveError::Io(e));
    }
    debug!(path = %dest.display(), "file decrypted");
    Ok(dest)
}

/// Re-encrypt `archive` under a new password, replacing it atomically.
pub fn rewrap(archive: &Path, old_password: &str, new_password: &str) -> Result<()> {
    let (name, bytes) = read_entry(archive, old_password)?;
    write_archive(archive, &name, &bytes, new_password)
}

/// Decrypt `archive` into `dir`, leaving the archive in place.
///
/// The copy gets a unique name ending in the entry's file name. Returns its path.
pub fn extract_to(archive: &Path, password: &str, dir: &Path) -> Result<PathBuf> {
    let (name, bytes) = read_entry(archive, password)?;
    fs::create_dir_all(dir)?;
    let file_name = Path::new(&name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let dest = dir.join(format!("{}_{file_name}", uuid::Uuid::new_v4().simple()));

    write_atomically(&dest, |mut file| {
        file.write_all(&bytes)?;
        Ok(file)
    })
    .inspect_err(|e| warn!(path = %dest.display(), error = %e, "extract failed"))?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_plain(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_archive_path_helpers() {
        let plain = Path::new("private/user_1/abc.pdf");
        let archive = archive_path(plain);
        assert_eq!(archive, Path::new("private/user_1/abc.pdf.zip"));
        assert_eq!(plain_path(&archive).unwrap(), plain);
        assert!(plain_path(plain).is_none());
        assert!(is_archive_path("x.txt.zip"));
        assert!(!is_archive_path("x.txt"));
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let dir = TempDir::new().unwrap();
        let content = b"quarterly numbers\n".repeat(100);
        let plain = write_plain(&dir, "abc.txt", &content);

        let archive = encrypt_in_place(&plain, "abc123").unwrap();
        assert_eq!(file_names(dir.path()), vec!["abc.txt.zip"]);
        assert_ne!(fs::read(&archive).unwrap(), content);

        let restored = decrypt_in_place(&archive, "abc123").unwrap();
        assert_eq!(restored, plain);
        assert_eq!(fs::read(&restored).unwrap(), content);
        assert_eq!(file_names(dir.path()), vec!["abc.txt"]);
    }

    #[test]
    fn test_archive_is_standard_zip() {
        let dir = TempDir::new().unwrap();
        let plain = write_plain(&dir, "abc.txt", b"hello");
        let archive = encrypt_in_place(&plain, "pw").unwrap();

        let zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(zip.len(), 1);
        assert_eq!(zip.name_for_index(0), Some("abc.txt"));
    }

    #[test]
    fn test_wrong_password_leaves_archive_untouched() {
        let dir = TempDir::new().unwrap();
        let plain = write_plain(&dir, "abc.txt", b"secret");
        let archive = encrypt_in_place(&plain, "abc123").unwrap();
        let before = fs::read(&archive).unwrap();

        let err = decrypt_in_place(&archive, "wrong-password").unwrap_err();
        assert!(matches!(err, ArchiveError::WrongPassword));
        assert!(matches!(HostError::from(err), HostError::WrongPassword));

        assert_eq!(fs::read(&archive).unwrap(), before);
        assert_eq!(file_names(dir.path()), vec!["abc.txt.zip"]);
    }

    #[test]
    fn test_missing_and_corrupt_are_distinct_from_wrong_password() {
        let dir = TempDir::new().unwrap();

        let missing = decrypt_in_place(&dir.path().join("gone.txt.zip"), "pw").unwrap_err();
        assert!(matches!(missing, ArchiveError::Missing(_)));
        assert!(matches!(HostError::from(missing), HostError::NotFound(_)));

        let bogus = write_plain(&dir, "bogus.txt.zip", b"not a zip at all");
        let corrupt = decrypt_in_place(&bogus, "pw").unwrap_err();
        assert!(matches!(corrupt, ArchiveError::Corrupt { .. }));
        assert!(HostError::from(corrupt).is_storage_failure());

        let missing = encrypt_in_place(&dir.path().join("none.txt"), "pw").unwrap_err();
        assert!(matches!(missing, ArchiveError::Missing(_)));
    }

    #[test]
    fn test_decrypt_requires_archive_suffix() {
        let dir = TempDir::new().unwrap();
        let plain = write_plain(&dir, "abc.txt", b"x");
        assert!(matches!(
            decrypt_in_place(&plain, "pw"),
            Err(ArchiveError::NotAnArchive(_))
        ));
    }

    #[test]
    fn test_rewrap_changes_password() {
        let dir = TempDir::new().unwrap();
        let plain = write_plain(&dir, "abc.txt", b"payload");
        let archive = encrypt_in_place(&plain, "old-pass").unwrap();

        assert!(matches!(
            rewrap(&archive, "nope", "new-pass"),
            Err(ArchiveError::WrongPassword)
        ));
        rewrap(&archive, "old-pass", "new-pass").unwrap();

        assert!(matches!(
            read_entry(&archive, "old-pass"),
            Err(ArchiveError::WrongPassword)
        ));
        let (name, bytes) = read_entry(&archive, "new-pass").unwrap();
        assert_eq!(name, "abc.txt");
        assert_eq!(bytes, b"payload");
        assert_eq!(file_names(dir.path()), vec!["abc.txt.zip"]);
    }

    #[test]
    fn test_extract_to_keeps_archive() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let plain = write_plain(&dir, "abc.pdf", b"%PDF-1.4");
        let archive = encrypt_in_place(&plain, "pw").unwrap();

        let copy = extract_to(&archive, "pw", out.path()).unwrap();

        assert!(archive.exists());
        assert!(copy.starts_with(out.path()));
        assert!(copy.to_string_lossy().ends_with("_abc.pdf"));
        assert_eq!(fs::read(&copy).unwrap(), b"%PDF-1.4");
    }
}
