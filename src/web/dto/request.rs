//! Request DTOs for the web API.

use serde::Deserialize;
use validator::Validate;

use crate::files::EncryptionChange;

/// User registration request.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Login request.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Access token creation request.
#[derive(Debug, Default, Deserialize)]
pub struct CreateTokenRequest {
    /// Device label; generated when absent.
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Encryption change requested on a private file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EncryptionRequest {
    Enable { password: String },
    Disable { password: String },
    ChangePassword { old_password: String, new_password: String },
}

impl From<EncryptionRequest> for EncryptionChange {
    fn from(req: EncryptionRequest) -> Self {
        match req {
            EncryptionRequest::Enable { password } => EncryptionChange::Enable { password },
            EncryptionRequest::Disable { password } => EncryptionChange::Disable { password },
            EncryptionRequest::ChangePassword {
                old_password,
                new_password,
            } => EncryptionChange::ChangePassword {
                old: old_password,
                new: new_password,
            },
        }
    }
}

/// Private file update request.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePrivateFileRequest {
    #[validate(length(min = 1, message = "Name must not be empty"))]
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub encryption: Option<EncryptionRequest>,
}

/// Password for opening an encrypted private file.
#[derive(Debug, Default, Deserialize)]
pub struct FilePasswordQuery {
    #[serde(default)]
    pub password: Option<String>,
}

/// Role assignment request.
#[derive(Debug, Deserialize, Validate)]
pub struct AssignRoleRequest {
    #[validate(length(min = 1, message = "Role is required"))]
    pub role: String,
}

/// Tag creation request.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTagRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
}

/// Tags to put on an image, by name.
#[derive(Debug, Deserialize, Validate)]
pub struct TagImageRequest {
    #[validate(length(min = 1, message = "At least one tag is required"))]
    pub tags: Vec<String>,
}

/// Role or permission creation request.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 64, message = "Name must be 1-64 characters"))]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Permission creation request.
pub type CreatePermissionRequest = CreateRoleRequest;

/// Full replacement of a role's permissions.
#[derive(Debug, Deserialize)]
pub struct RolePermissionsRequest {
    pub permissions: Vec<String>,
}

/// A single permission to attach to a role.
#[derive(Debug, Deserialize, Validate)]
pub struct GrantPermissionRequest {
    #[validate(length(min = 1, message = "Permission is required"))]
    pub permission: String,
}

/// Role activation request.
#[derive(Debug, Deserialize)]
pub struct RoleActiveRequest {
    pub is_active: bool,
}

/// Account status change request.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    /// `active`, `inactive` or `banned`.
    pub status: String,
}

/// Query parameters accepted by the proxy verification endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}
