//! Account registration and sign-in.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::auth::{authenticate, register as register_account, RegistrationRequest};
use crate::web::dto::{ApiResponse, LoginRequest, LoginResponse, RegisterRequest, ValidatedJson};
use crate::web::error::ApiError;

use super::AppState;

/// POST /api/auth/register - Create an account and sign it in.
pub async fn register(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<LoginResponse>>), ApiError> {
    let mut request = RegistrationRequest::new(req.name, req.password);
    if let Some(email) = req.email.filter(|e| !e.trim().is_empty()) {
        request = request.with_email(email);
    }

    let user = register_account(state.db.pool(), request).await?;
    let access_token = state.jwt.issue(&user)?;

    let response = LoginResponse {
        access_token,
        expires_in: state.jwt.expiry_secs(),
        user: user.into(),
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::new(response))))
}

/// POST /api/auth/login - Exchange credentials for a session token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let user = authenticate(state.db.pool(), &req.name, &req.password).await?;
    let access_token = state.jwt.issue(&user)?;
    tracing::info!(user_id = user.id, "user signed in");

    let response = LoginResponse {
        access_token,
        expires_in: state.jwt.expiry_secs(),
        user: user.into(),
    };
    Ok(Json(ApiResponse::new(response)))
}
