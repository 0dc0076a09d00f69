//! Password hashing.
//!
//! Uses Argon2id for account passwords and for the secrets protecting
//! encrypted files.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use rand_core::OsRng;
use thiserror::Error;

use crate::HostError;

/// Password-related errors.
#[derive(Error, Debug)]
pub enum PasswordError {
    /// Password hashing failed.
    #[error("password hashing failed: {0}")]
    HashError(String),

    /// Password hash is invalid.
    #[error("invalid password hash format")]
    InvalidHash,

    /// Password verification failed (wrong password).
    #[error("password verification failed")]
    VerificationFailed,
}

impl From<PasswordError> for HostError {
    fn from(e: PasswordError) -> Self {
        match e {
            PasswordError::VerificationFailed => {
                HostError::Unauthenticated("invalid credentials".to_string())
            }
            other => HostError::Credential(other.to_string()),
        }
    }
}

/// Create the Argon2 hasher.
///
/// Parameters:
/// - Memory cost: 19 MiB (19456 KiB)
/// - Time cost: 2 iterations
/// - Parallelism: 1 thread
fn create_argon2() -> Result<Argon2<'static>, PasswordError> {
    let params = Params::new(19456, 2, 1, None)
        .map_err(|e| PasswordError::HashError(e.to_string()))?;
    Ok(Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        params,
    ))
}

/// Hash a password using Argon2id.
///
/// Returns a PHC-formatted hash string that includes the salt and parameters.
/// No strength policy is applied here; see [`super::validation`].
///
/// # Examples
///
/// ```
/// use imghost::auth::hash_password;
///
/// let hash = hash_password("secret#42").unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = create_argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashError(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
///
/// The parameters are taken from the parsed hash, so hashes made with
/// older parameters keep verifying.
pub fn verify_password(password: &str, hash: &str) -> Result<(), PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHash)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| PasswordError::VerificationFailed)
}

/// Check the password of an encrypted file against its stored secret.
///
/// A missing or mismatching password is [`HostError::WrongPassword`].
pub fn verify_file_secret(password: Option<&str>, secret_hash: &str) -> crate::Result<()> {
    let Some(password) = password.filter(|p| !p.is_empty()) else {
        return Err(HostError::WrongPassword);
    };
    match verify_password(password, secret_hash) {
        Ok(()) => Ok(()),
        Err(PasswordError::VerificationFailed) => Err(HostError::WrongPassword),
        Err(e) => Err(e.into()),
    }
}
