//! Input validation for account registration.

use thiserror::Error;

use crate::HostError;

/// Minimum user name length.
pub const MIN_NAME_LENGTH: usize = 3;

/// Maximum user name length.
pub const MAX_NAME_LENGTH: usize = 32;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length.
pub const MAX_PASSWORD_LENGTH: usize = 20;

/// Maximum email length.
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("user name must be at least {MIN_NAME_LENGTH} characters")]
    NameTooShort,

    #[error("user name must be at most {MAX_NAME_LENGTH} characters")]
    NameTooLong,

    #[error("user name can only contain letters and digits")]
    NameInvalidChars,

    #[error("password must be at least {MIN_PASSWORD_LENGTH} characters")]
    PasswordTooShort,

    #[error("password must be at most {MAX_PASSWORD_LENGTH} characters")]
    PasswordTooLong,

    /// Password lacks a letter, a digit or a symbol.
    #[error("password must contain a letter, a digit and a symbol")]
    PasswordTooWeak,

    #[error("email must be at most {MAX_EMAIL_LENGTH} characters")]
    EmailTooLong,

    #[error("invalid email format")]
    EmailInvalidFormat,
}

impl From<ValidationError> for HostError {
    fn from(e: ValidationError) -> Self {
        HostError::Validation(e.to_string())
    }
}

/// Validate a user name.
///
/// Requirements:
/// - Length: 3-32 characters
/// - Characters: ASCII letters and digits
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.len() < MIN_NAME_LENGTH {
        return Err(ValidationError::NameTooShort);
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::NameTooLong);
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::NameInvalidChars);
    }
    Ok(())
}

/// Validate an account password.
///
/// Requirements:
/// - Length: 8-20 characters
/// - At least one ASCII letter, one digit and one symbol
///
/// # Examples
///
/// ```
/// use imghost::auth::validation::validate_password;
///
/// assert!(validate_password("secret#42").is_ok());
/// assert!(validate_password("secret42").is_err()); // no symbol
/// ```
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::PasswordTooShort);
    }
    if len > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::PasswordTooLong);
    }

    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password
        .chars()
        .any(|c| !c.is_ascii_alphanumeric() || c == '_');
    if !(has_letter && has_digit && has_symbol) {
        return Err(ValidationError::PasswordTooWeak);
    }
    Ok(())
}

/// Validate an email address (optional field).
///
/// Empty is accepted. Otherwise performs a basic format check.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Ok(());
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::EmailTooLong);
    }
    if email.chars().any(|c| c.is_whitespace()) {
        return Err(ValidationError::EmailInvalidFormat);
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::EmailInvalidFormat);
    };
    if local.is_empty() || domain.contains('@') || !domain.contains('.') {
        return Err(ValidationError::EmailInvalidFormat);
    }
    if domain.split('.').any(|p| p.is_empty()) {
        return Err(ValidationError::EmailInvalidFormat);
    }
    Ok(())
}

/// Validate all registration fields at once.
///
/// Returns the first validation error encountered.
pub fn validate_registration(
    name: &str,
    password: &str,
    email: Option<&str>,
) -> Result<(), ValidationError> {
    validate_name(name)?;
    validate_password(password)?;
    if let Some(e) = email {
        validate_email(e)?;
    }
    Ok(())
}
