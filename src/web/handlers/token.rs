//! Access token management for the caller's devices.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

use crate::web::dto::{ApiResponse, CreateTokenRequest, CreatedTokenResponse, TokenResponse};
use crate::web::error::ApiError;
use crate::web::middleware::AuthUser;

use super::AppState;

/// First address in `X-Forwarded-For`, as set by the front proxy.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// POST /api/tokens - Issue an access token. The raw token is returned once.
pub async fn create_token(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    headers: HeaderMap,
    body: Option<Json<CreateTokenRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedTokenResponse>>), ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let ip = client_ip(&headers);
    let issued = state
        .tokens()
        .create(claims.sub, req.device_id.as_deref(), ip.as_deref())
        .await?;

    let response = CreatedTokenResponse {
        token: issued.token,
        info: issued.record.into(),
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::new(response))))
}

/// GET /api/tokens - The caller's active tokens.
pub async fn list_tokens(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ApiResponse<Vec<TokenResponse>>>, ApiError> {
    let tokens = state.tokens().list(claims.sub).await?;
    Ok(Json(ApiResponse::new(
        tokens.into_iter().map(TokenResponse::from).collect(),
    )))
}

/// DELETE /api/tokens/:token - Revoke one of the caller's tokens.
pub async fn revoke_token(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(token): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.tokens().revoke(claims.sub, token.trim()).await?;
    Ok(StatusCode::NO_CONTENT)
}
