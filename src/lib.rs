//! imghost - multi-tenant image and private file hosting.
//!
//! Content-addressed storage for public images and per-user private files,
//! role-based route permissions, and opaque access tokens checked by a
//! reverse proxy before it serves a stored file.

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod files;
pub mod logging;
pub mod rbac;
pub mod storage;
pub mod web;

pub use auth::{hash_password, verify_password, PasswordError, ValidationError};
pub use config::Config;
pub use db::{Database, NewUser, User, UserRepository, UserStatus};
pub use error::{HostError, Result};
