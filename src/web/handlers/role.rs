//! Role and permission administration.
//!
//! Changes to a role take effect on the next request of every holder; the
//! service drops all cached permission sets.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::UserRepository;
use crate::web::dto::{
    ApiResponse, CreatePermissionRequest, CreateRoleRequest, GrantPermissionRequest,
    PermissionResponse, RoleActiveRequest, RolePermissionsRequest, RolePermissionsResponse,
    RoleResponse, SyncResponse, UserPermissionsResponse, ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::middleware::AuthUser;

use super::{parse_id, AppState};

/// GET /api/roles - All roles.
pub async fn list_roles(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<RoleResponse>>>, ApiError> {
    let roles = state.rbac().list_roles().await?;
    Ok(Json(ApiResponse::new(
        roles.into_iter().map(RoleResponse::from).collect(),
    )))
}

/// POST /api/roles - Create an empty, active role.
pub async fn create_role(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<CreateRoleRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RoleResponse>>), ApiError> {
    let role = state.rbac().create_role(&req.name, &req.description).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(role.into()))))
}

/// PUT /api/roles/:role/active - Switch a role on or off.
pub async fn set_role_active(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
    Json(req): Json<RoleActiveRequest>,
) -> Result<StatusCode, ApiError> {
    state.rbac().set_role_active(&role, req.is_active).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/roles/:role/permissions
pub async fn get_role_permissions(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
) -> Result<Json<ApiResponse<RolePermissionsResponse>>, ApiError> {
    let permissions = state.rbac().role_permissions(&role).await?;
    Ok(Json(ApiResponse::new(RolePermissionsResponse::new(
        &role,
        permissions,
    ))))
}

/// PUT /api/roles/:role/permissions - Replace a role's permission set.
pub async fn replace_role_permissions(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
    Json(req): Json<RolePermissionsRequest>,
) -> Result<Json<ApiResponse<RolePermissionsResponse>>, ApiError> {
    let mut names: Vec<String> = req
        .permissions
        .iter()
        .map(|p| p.trim().to_string())
        .collect();
    if names.iter().any(String::is_empty) {
        return Err(ApiError::bad_request("permission names must not be empty"));
    }
    names.sort();
    names.dedup();

    let rbac = state.rbac();
    rbac.replace_role_permissions(&role, &names).await?;
    let permissions = rbac.role_permissions(&role).await?;
    Ok(Json(ApiResponse::new(RolePermissionsResponse::new(
        &role,
        permissions,
    ))))
}

/// POST /api/roles/:role/permissions - Attach one permission.
pub async fn grant_role_permission(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
    ValidatedJson(req): ValidatedJson<GrantPermissionRequest>,
) -> Result<Json<ApiResponse<RolePermissionsResponse>>, ApiError> {
    let rbac = state.rbac();
    rbac.grant_permission(&role, req.permission.trim()).await?;
    let permissions = rbac.role_permissions(&role).await?;
    Ok(Json(ApiResponse::new(RolePermissionsResponse::new(
        &role,
        permissions,
    ))))
}

/// DELETE /api/roles/:role/permissions/:permission - Detach one permission.
pub async fn revoke_role_permission(
    State(state): State<Arc<AppState>>,
    Path((role, permission)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    if !state.rbac().revoke_permission(&role, &permission).await? {
        return Err(ApiError::not_found(format!(
            "role '{role}' does not hold '{permission}'"
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/permissions - Every known permission.
pub async fn list_permissions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<PermissionResponse>>>, ApiError> {
    let permissions = state.rbac().list_permissions().await?;
    Ok(Json(ApiResponse::new(
        permissions.into_iter().map(PermissionResponse::from).collect(),
    )))
}

/// POST /api/permissions - Register a new permission.
pub async fn create_permission(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<CreatePermissionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PermissionResponse>>), ApiError> {
    let permission = state
        .rbac()
        .create_permission(&req.name, &req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(permission.into()))))
}

/// POST /api/permissions/sync - Re-apply the configured roles.
///
/// Additive: grants made at runtime are kept.
pub async fn sync_permissions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<SyncResponse>>, ApiError> {
    let report = state
        .rbac()
        .sync_roles(&state.config.permissions.roles)
        .await?;
    Ok(Json(ApiResponse::new(report.into())))
}

/// GET /api/users/:id/permissions - A user's effective permissions.
pub async fn get_user_permissions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UserPermissionsResponse>>, ApiError> {
    let id = parse_id(&id)?;
    UserRepository::new(state.db.pool())
        .get_by_id(id)
        .await?
        .filter(|u| u.deleted_at.is_none())
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    let permissions = state.rbac().user_permissions(id).await?;
    Ok(Json(ApiResponse::new(UserPermissionsResponse::new(
        id,
        permissions,
    ))))
}

/// GET /api/users/me/permissions - The caller's effective permissions.
pub async fn get_my_permissions(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ApiResponse<UserPermissionsResponse>>, ApiError> {
    let permissions = state.rbac().user_permissions(claims.sub).await?;
    Ok(Json(ApiResponse::new(UserPermissionsResponse::new(
        claims.sub,
        permissions,
    ))))
}
