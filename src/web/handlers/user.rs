//! User administration.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::{UserRepository, UserStatus};
use crate::web::dto::{
    ApiResponse, AssignRoleRequest, UpdateStatusRequest, UserInfo, UserRolesResponse,
    ValidatedJson,
};
use crate::web::error::ApiError;

use super::{parse_id, AppState};

/// GET /api/users/:id/roles - Roles held by a user.
pub async fn list_user_roles(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UserRolesResponse>>, ApiError> {
    let id = parse_id(&id)?;
    let roles = state.rbac().user_roles(id).await?;
    Ok(Json(ApiResponse::new(UserRolesResponse::new(id, roles))))
}

/// POST /api/users/:id/roles - Give a role to a user.
pub async fn add_user_role(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<AssignRoleRequest>,
) -> Result<Json<ApiResponse<UserRolesResponse>>, ApiError> {
    let id = parse_id(&id)?;
    let rbac = state.rbac();
    rbac.assign_role(id, req.role.trim()).await?;
    let roles = rbac.user_roles(id).await?;
    Ok(Json(ApiResponse::new(UserRolesResponse::new(id, roles))))
}

/// DELETE /api/users/:id/roles/:role - Take a role from a user.
pub async fn remove_user_role(
    State(state): State<Arc<AppState>>,
    Path((id, role)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state.rbac().remove_role(id, &role).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/users/:id/status - Activate, deactivate or ban an account.
///
/// Cached permissions and token identities of the user are dropped, so the
/// change applies to the next request.
pub async fn update_user_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    let id = parse_id(&id)?;
    let status: UserStatus = req
        .status
        .parse()
        .map_err(|_| ApiError::bad_request(format!("unknown status '{}'", req.status)))?;

    let user = UserRepository::new(state.db.pool())
        .set_status(id, status)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    state.cache().purge_user(id);
    tracing::info!(user_id = id, status = %status, "user status changed");

    Ok(Json(ApiResponse::new(user.into())))
}

/// DELETE /api/users/:id - Soft-delete an account.
///
/// Roles are removed, tokens revoked and private files marked deleted.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    if !UserRepository::new(state.db.pool()).soft_delete(id).await? {
        return Err(ApiError::not_found("user not found"));
    }
    state.cache().purge_user(id);
    tracing::info!(user_id = id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
