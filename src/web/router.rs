//! Router configuration for the web API.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{
    add_image_tag, add_user_role, batch_upload_images, batch_upload_private_files,
    create_permission, create_role, create_tag, create_token, delete_image, delete_private_file,
    delete_user, download_private_file, get_image, get_my_permissions, get_private_file,
    get_role_permissions, get_user_permissions, grant_role_permission, list_image_tags,
    list_images, list_permissions, list_private_files, list_roles, list_tags, list_tokens,
    list_user_roles, login, register, remove_image_tag, remove_user_role,
    replace_role_permissions, revoke_role_permission, revoke_token, set_role_active,
    sync_permissions, tag_image, update_private_file, update_user_status, upload_image,
    upload_private_file, verify_token, AppState,
};
use super::middleware::{authorize, create_cors_layer};

/// Multipart overhead allowed on top of the largest accepted file.
const MULTIPART_SLACK_BYTES: usize = 64 * 1024;

/// Body limit for a batch of up to `max_files` files of `max_file_bytes` each.
fn batch_body_limit(max_file_bytes: u64, max_files: usize) -> usize {
    (max_file_bytes as usize).saturating_mul(max_files) + MULTIPART_SLACK_BYTES
}

/// Create the main API router.
///
/// Every `/api` request passes the route permission check before reaching
/// its handler.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(register))
        .route("/login", post(login));

    let storage = &app_state.config.storage;
    let image_batch_limit = batch_body_limit(storage.max_image_bytes(), storage.max_batch_files);
    let private_batch_limit =
        batch_body_limit(storage.max_private_bytes(), storage.max_batch_files);

    let image_routes = Router::new()
        .route("/", get(list_images).post(upload_image))
        .route(
            "/batch",
            post(batch_upload_images).layer(DefaultBodyLimit::max(image_batch_limit)),
        )
        .route("/:id", get(get_image).delete(delete_image))
        .route("/:id/tags", get(list_image_tags).post(tag_image))
        .route("/:id/tags/:tag_id", post(add_image_tag).delete(remove_image_tag));

    let tag_routes = Router::new().route("/", get(list_tags).post(create_tag));

    let private_routes = Router::new()
        .route("/", get(list_private_files).post(upload_private_file))
        .route(
            "/batch",
            post(batch_upload_private_files).layer(DefaultBodyLimit::max(private_batch_limit)),
        )
        .route(
            "/:id",
            get(get_private_file)
                .put(update_private_file)
                .delete(delete_private_file),
        )
        .route("/:id/download", get(download_private_file));

    let token_routes = Router::new()
        .route("/", get(list_tokens).post(create_token))
        .route("/:token", delete(revoke_token));

    let user_routes = Router::new()
        .route("/:id", delete(delete_user))
        .route("/:id/roles", get(list_user_roles).post(add_user_role))
        .route("/:id/roles/:role", delete(remove_user_role))
        .route("/:id/status", put(update_user_status))
        .route("/:id/permissions", get(get_user_permissions))
        .route("/me/permissions", get(get_my_permissions));

    let role_routes = Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/:role/active", put(set_role_active))
        .route(
            "/:role/permissions",
            get(get_role_permissions)
                .put(replace_role_permissions)
                .post(grant_role_permission),
        )
        .route("/:role/permissions/:permission", delete(revoke_role_permission));

    let permission_routes = Router::new()
        .route("/", get(list_permissions).post(create_permission))
        .route("/sync", post(sync_permissions));

    let api_routes = Router::new()
        .route("/verify-token", get(verify_token))
        .nest("/auth", auth_routes)
        .nest("/images", image_routes)
        .nest("/tags", tag_routes)
        .nest("/private-files", private_routes)
        .nest("/tokens", token_routes)
        .nest("/users", user_routes)
        .nest("/roles", role_routes)
        .nest("/permissions", permission_routes);

    let body_limit = storage.max_image_bytes().max(storage.max_private_bytes()) as usize
        + MULTIPART_SLACK_BYTES;
    let cors = create_cors_layer(&app_state.config.server.cors_origins);

    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(body_limit))
                .layer(middleware::from_fn_with_state(
                    Arc::clone(&app_state),
                    authorize,
                )),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

async fn health_check() -> &'static str {
    "OK"
}
