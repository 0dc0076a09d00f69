//! API handlers.

pub mod auth;
pub mod image;
pub mod private_file;
pub mod role;
pub mod tag;
pub mod token;
pub mod user;
pub mod verify;

pub use auth::{login, register};
pub use image::{batch_upload_images, delete_image, get_image, list_images, upload_image};
pub use private_file::{
    batch_upload_private_files, delete_private_file, download_private_file, get_private_file,
    list_private_files, update_private_file, upload_private_file,
};
pub use role::{
    create_permission, create_role, get_my_permissions, get_role_permissions,
    get_user_permissions, grant_role_permission, list_permissions, list_roles,
    replace_role_permissions, revoke_role_permission, set_role_active, sync_permissions,
};
pub use tag::{add_image_tag, create_tag, list_image_tags, list_tags, remove_image_tag, tag_image};
pub use token::{create_token, list_tokens, revoke_token};
pub use user::{add_user_role, delete_user, list_user_roles, remove_user_role, update_user_status};
pub use verify::verify_token;

use axum::extract::Multipart;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{TokenService, TokenVerifier};
use crate::cache::PermissionCache;
use crate::files::{ImageService, PrivateFileService, TagService};
use crate::rbac::{PermissionResolver, RbacService, RouteTable};
use crate::storage::{FileStore, KeyedLocks};
use crate::web::error::ApiError;
use crate::web::middleware::JwtState;
use crate::{Config, Database};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub store: FileStore,
    pub resolver: Arc<PermissionResolver>,
    pub locks: Arc<KeyedLocks>,
    pub verifier: TokenVerifier,
    pub jwt: Arc<JwtState>,
}

impl AppState {
    /// Wire the services for `config` over an open database.
    pub fn new(db: Database, config: Config) -> crate::Result<Self> {
        let cache = Arc::new(PermissionCache::new(Duration::from_secs(
            config.tokens.cache_ttl_secs,
        )));
        let routes = Arc::new(RouteTable::from_map(&config.permissions.routes)?);
        let resolver = Arc::new(PermissionResolver::new(routes, cache));
        let store = FileStore::new(&config.storage.root)?;
        let verifier = TokenVerifier::new(db.pool().clone(), Arc::clone(&resolver), store.clone());
        let jwt = Arc::new(JwtState::new(
            &config.server.jwt_secret,
            config.server.jwt_expiry_secs,
        ));

        Ok(Self {
            db,
            config: Arc::new(config),
            store,
            resolver,
            locks: Arc::new(KeyedLocks::new()),
            verifier,
            jwt,
        })
    }

    pub fn cache(&self) -> &PermissionCache {
        self.resolver.cache()
    }

    pub fn images(&self) -> ImageService<'_> {
        ImageService::new(
            self.db.pool(),
            &self.store,
            &self.locks,
            &self.config.storage,
        )
    }

    pub fn private_files(&self) -> PrivateFileService<'_> {
        PrivateFileService::new(
            self.db.pool(),
            &self.store,
            &self.locks,
            &self.config.storage,
        )
    }

    pub fn tags(&self) -> TagService<'_> {
        TagService::new(self.db.pool())
    }

    pub fn tokens(&self) -> TokenService<'_> {
        TokenService::new(self.db.pool(), self.cache())
            .with_expiry_days(self.config.tokens.expiry_days)
    }

    pub fn rbac(&self) -> RbacService<'_> {
        RbacService::new(self.db.pool(), self.cache())
    }
}

/// An uploaded file and the text fields sent alongside it.
#[derive(Debug, Default)]
pub(crate) struct UploadForm {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub description: Option<String>,
    pub password: Option<String>,
}

/// Collect the `file` part plus `description` and `password` fields.
pub(crate) async fn read_upload(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    let mut has_file = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from_multipart(e, "multipart data"))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                form.filename = field.file_name().unwrap_or("").to_string();
                form.content_type = field.content_type().map(str::to_string);
                form.bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::from_multipart(e, "file"))?
                    .to_vec();
                has_file = true;
            }
            "description" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::from_multipart(e, "description"))?;
                form.description = Some(text);
            }
            "password" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::from_multipart(e, "password field"))?;
                form.password = Some(text).filter(|p| !p.is_empty());
            }
            _ => {}
        }
    }

    if !has_file || form.filename.is_empty() {
        return Err(ApiError::bad_request("No file provided"));
    }
    Ok(form)
}

/// One file of a batch upload.
#[derive(Debug)]
pub(crate) struct BatchFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Files of a batch upload plus the fields applied to all of them.
#[derive(Debug, Default)]
pub(crate) struct BatchForm {
    pub files: Vec<BatchFile>,
    pub description: Option<String>,
    pub password: Option<String>,
}

/// Collect every `files[]`, `files` or `file` part of a batch upload.
///
/// More than `max_files` files is rejected before anything is stored.
pub(crate) async fn read_batch(
    mut multipart: Multipart,
    max_files: usize,
) -> Result<BatchForm, ApiError> {
    let mut form = BatchForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from_multipart(e, "multipart data"))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "files[]" | "files" | "file" => {
                if form.files.len() == max_files {
                    return Err(ApiError::bad_request(format!(
                        "at most {max_files} files per batch"
                    )));
                }
                let filename = field.file_name().unwrap_or("").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::from_multipart(e, "file"))?
                    .to_vec();
                form.files.push(BatchFile {
                    filename,
                    content_type,
                    bytes,
                });
            }
            "description" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::from_multipart(e, "description"))?;
                form.description = Some(text);
            }
            "password" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::from_multipart(e, "password field"))?;
                form.password = Some(text).filter(|p| !p.is_empty());
            }
            _ => {}
        }
    }

    if form.files.is_empty() {
        return Err(ApiError::bad_request("No files provided"));
    }
    Ok(form)
}

/// Parse a numeric path id.
pub(crate) fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request(format!("invalid id '{raw}'")))
}
