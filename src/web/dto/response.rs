//! Response DTOs for the web API.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{AccessToken, User, UserStatus};
use crate::files::{Image, PrivateFile, Tag};
use crate::rbac::{Permission, Role, SyncReport};
use crate::web::error::{ApiError, ErrorCode};

/// Standard API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Public view of a user.
#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub status: UserStatus,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            status: user.status,
        }
    }
}

/// Login and registration response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Session JWT for the API.
    pub access_token: String,
    /// Seconds until `access_token` expires.
    pub expires_in: u64,
    pub user: UserInfo,
}

/// Image metadata.
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub size: i64,
    pub mime_type: String,
    pub views: i64,
    pub created_at: DateTime<Utc>,
}

impl ImageResponse {
    pub fn new(image: Image, url: String) -> Self {
        Self {
            id: image.id,
            name: image.name,
            description: image.description,
            url,
            thumbnail: image.thumbnail_path,
            size: image.size,
            mime_type: image.mime_type,
            views: image.views,
            created_at: image.created_at,
        }
    }
}

/// Private file metadata. Never includes the storage path or secret.
#[derive(Debug, Serialize)]
pub struct PrivateFileResponse {
    pub id: i64,
    pub name: String,
    pub ext: String,
    pub size: i64,
    pub mime_type: String,
    pub is_encrypted: bool,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PrivateFile> for PrivateFileResponse {
    fn from(file: PrivateFile) -> Self {
        Self {
            id: file.id,
            name: file.name,
            ext: file.ext,
            size: file.size,
            mime_type: file.mime_type,
            is_encrypted: file.is_encrypted,
            views: file.views,
            created_at: file.created_at,
            updated_at: file.updated_at,
        }
    }
}

/// Access token metadata.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub id: i64,
    pub device_id: String,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<AccessToken> for TokenResponse {
    fn from(token: AccessToken) -> Self {
        Self {
            id: token.id,
            device_id: token.device_id,
            expires_at: token.expires_at,
            last_used_at: token.last_used_at,
            created_at: token.created_at,
        }
    }
}

/// A freshly issued access token. The raw token is shown only once.
#[derive(Debug, Serialize)]
pub struct CreatedTokenResponse {
    pub token: String,
    #[serde(flatten)]
    pub info: TokenResponse,
}

/// Roles held by a user.
#[derive(Debug, Serialize)]
pub struct UserRolesResponse {
    pub user_id: i64,
    pub roles: Vec<String>,
}

impl UserRolesResponse {
    pub fn new(user_id: i64, roles: Vec<Role>) -> Self {
        Self {
            user_id,
            roles: roles.into_iter().map(|r| r.name).collect(),
        }
    }
}

/// A role without its permissions.
#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Role> for RoleResponse {
    fn from(role: Role) -> Self {
        Self {
            id: role.id,
            name: role.name,
            description: role.description,
            is_active: role.is_active,
            created_at: role.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PermissionResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
}

impl From<Permission> for PermissionResponse {
    fn from(permission: Permission) -> Self {
        Self {
            id: permission.id,
            name: permission.name,
            description: permission.description,
        }
    }
}

/// Permissions attached to a role.
#[derive(Debug, Serialize)]
pub struct RolePermissionsResponse {
    pub role: String,
    pub permissions: Vec<String>,
}

impl RolePermissionsResponse {
    pub fn new(role: &str, permissions: Vec<Permission>) -> Self {
        Self {
            role: role.to_string(),
            permissions: permissions.into_iter().map(|p| p.name).collect(),
        }
    }
}

/// A user's effective permissions, sorted by name.
#[derive(Debug, Serialize)]
pub struct UserPermissionsResponse {
    pub user_id: i64,
    pub permissions: Vec<String>,
}

impl UserPermissionsResponse {
    pub fn new(user_id: i64, permissions: impl IntoIterator<Item = String>) -> Self {
        let mut permissions: Vec<String> = permissions.into_iter().collect();
        permissions.sort();
        Self {
            user_id,
            permissions,
        }
    }
}

/// Rows added by a configuration sync.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub roles_created: u64,
    pub permissions_created: u64,
    pub grants_created: u64,
}

impl From<SyncReport> for SyncResponse {
    fn from(report: SyncReport) -> Self {
        Self {
            roles_created: report.roles_created,
            permissions_created: report.permissions_created,
            grants_created: report.grants_created,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TagResponse {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<Tag> for TagResponse {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
            created_at: tag.created_at,
        }
    }
}

/// Tags carried by an image.
#[derive(Debug, Serialize)]
pub struct ImageTagsResponse {
    pub image_id: i64,
    pub tags: Vec<TagResponse>,
}

impl ImageTagsResponse {
    pub fn new(image_id: i64, tags: Vec<Tag>) -> Self {
        Self {
            image_id,
            tags: tags.into_iter().map(TagResponse::from).collect(),
        }
    }
}

/// Why one file of a batch failed.
#[derive(Debug, Serialize)]
pub struct BatchItemError {
    pub code: ErrorCode,
    pub message: String,
}

/// Outcome for one file of a batch upload.
#[derive(Debug, Serialize)]
pub struct BatchItem<T: Serialize> {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BatchItemError>,
}

/// Per-file results of a batch upload, in request order.
#[derive(Debug, Serialize)]
pub struct BatchResponse<T: Serialize> {
    pub total: usize,
    pub success_count: usize,
    pub results: Vec<BatchItem<T>>,
}

impl<T: Serialize> BatchResponse<T> {
    pub fn new(outcomes: Vec<(String, Result<T, ApiError>)>) -> Self {
        let total = outcomes.len();
        let results: Vec<BatchItem<T>> = outcomes
            .into_iter()
            .map(|(filename, outcome)| match outcome {
                Ok(data) => BatchItem {
                    filename,
                    data: Some(data),
                    error: None,
                },
                Err(e) => BatchItem {
                    filename,
                    data: None,
                    error: Some(BatchItemError {
                        code: e.code(),
                        message: e.message().to_string(),
                    }),
                },
            })
            .collect();
        let success_count = results.iter().filter(|r| r.data.is_some()).count();
        Self {
            total,
            success_count,
            results,
        }
    }
}
