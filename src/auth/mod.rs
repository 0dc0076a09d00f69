//! Authentication module for imghost.
//!
//! Password hashing, account registration and sign-in, opaque access
//! tokens, and the token verifier used by the reverse proxy.

mod account;
pub mod password;
mod token;
pub mod validation;
mod verifier;

pub use account::{authenticate, register, RegistrationRequest, DEFAULT_ROLE};
pub use password::{hash_password, verify_file_secret, verify_password, PasswordError};
pub use token::{generate_device_id, generate_token, IssuedToken, TokenService, DEFAULT_EXPIRY_DAYS};
pub use validation::ValidationError;
pub use verifier::{TokenVerifier, VerifiedAccess, MANAGE_ALL_FILES};
