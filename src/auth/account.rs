//! Account registration and sign-in.

use tracing::{debug, info};

use super::password::{hash_password, verify_password};
use super::validation::validate_registration;
use crate::db::{DbPool, NewUser, User, UserRepository};
use crate::rbac::RoleRepository;
use crate::{HostError, Result};

/// Role given to every newly registered account, if it exists.
pub const DEFAULT_ROLE: &str = "user";

/// Registration request data.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    /// Desired login name (3-32 letters or digits).
    pub name: String,
    /// Password (8-20 characters with a letter, a digit and a symbol).
    pub password: String,
    /// Optional email address.
    pub email: Option<String>,
}

impl RegistrationRequest {
    /// Create a new registration request.
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
            email: None,
        }
    }

    /// Set the email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Register a new user.
///
/// This function:
/// 1. Validates all input fields
/// 2. Checks if the name is already taken
/// 3. Hashes the password
/// 4. Creates the user and gives it the [`DEFAULT_ROLE`]
pub async fn register(pool: &DbPool, request: RegistrationRequest) -> Result<User> {
    let email = request.email.as_deref().filter(|e| !e.is_empty());
    validate_registration(&request.name, &request.password, email)?;

    let users = UserRepository::new(pool);
    if users.name_exists(&request.name).await? {
        return Err(HostError::AlreadyExists(format!("user '{}'", request.name)));
    }

    let password_hash = hash_password(&request.password)?;
    let mut new_user = NewUser::new(&request.name, password_hash);
    if let Some(email) = email {
        new_user = new_user.with_email(email);
    }
    let user = users.create(&new_user).await?;

    let roles = RoleRepository::new(pool);
    match roles.get_by_name(DEFAULT_ROLE).await? {
        Some(role) => {
            roles.assign_to_user(user.id, role.id).await?;
        }
        None => debug!(user_id = user.id, "default role missing, user has no roles"),
    }

    info!(name = %user.name, user_id = user.id, "New user registered");
    Ok(user)
}

/// Check a name and password.
///
/// Unknown names, wrong passwords and disabled or deleted accounts all fail
/// with `Unauthenticated`.
pub async fn authenticate(pool: &DbPool, name: &str, password: &str) -> Result<User> {
    let invalid = || HostError::Unauthenticated("invalid user name or password".to_string());

    let user = UserRepository::new(pool)
        .get_by_name(name)
        .await?
        .ok_or_else(invalid)?;

    verify_password(password, &user.password).map_err(|_| invalid())?;

    if !user.can_authenticate() {
        return Err(HostError::Unauthenticated(format!(
            "account is {}",
            user.status
        )));
    }
    debug!(user_id = user.id, "user authenticated");
    Ok(user)
}
