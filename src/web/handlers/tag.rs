//! Image tag handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::web::dto::{
    ApiResponse, CreateTagRequest, ImageTagsResponse, TagImageRequest, TagResponse,
    ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::middleware::AuthUser;

use super::{parse_id, AppState};

/// POST /api/tags - Create a tag. Names are unique per user.
pub async fn create_tag(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateTagRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TagResponse>>), ApiError> {
    let tag = state.tags().create_tag(claims.sub, &req.name).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(tag.into()))))
}

/// GET /api/tags - The caller's tags.
pub async fn list_tags(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ApiResponse<Vec<TagResponse>>>, ApiError> {
    let tags = state.tags().list_tags(claims.sub).await?;
    Ok(Json(ApiResponse::new(
        tags.into_iter().map(TagResponse::from).collect(),
    )))
}

/// GET /api/images/:id/tags - Tags on an image.
pub async fn list_image_tags(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ImageTagsResponse>>, ApiError> {
    let id = parse_id(&id)?;
    let tags = state.tags().image_tags(id).await?;
    Ok(Json(ApiResponse::new(ImageTagsResponse::new(id, tags))))
}

/// POST /api/images/:id/tags - Tag one of the caller's images by name.
///
/// Unknown names become new tags; all links are written together.
pub async fn tag_image(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<TagImageRequest>,
) -> Result<Json<ApiResponse<ImageTagsResponse>>, ApiError> {
    let id = parse_id(&id)?;
    let tags = state.tags().tag_image(claims.sub, id, &req.tags).await?;
    Ok(Json(ApiResponse::new(ImageTagsResponse::new(id, tags))))
}

/// POST /api/images/:id/tags/:tag_id - Put an existing tag on an image.
pub async fn add_image_tag(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path((id, tag_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<ImageTagsResponse>>, ApiError> {
    let id = parse_id(&id)?;
    let tag_id = parse_id(&tag_id)?;
    let service = state.tags();
    service.add_tag_to_image(claims.sub, id, tag_id).await?;
    let tags = service.image_tags(id).await?;
    Ok(Json(ApiResponse::new(ImageTagsResponse::new(id, tags))))
}

/// DELETE /api/images/:id/tags/:tag_id - Take a tag off an image.
pub async fn remove_image_tag(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path((id, tag_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    let tag_id = parse_id(&tag_id)?;
    state
        .tags()
        .remove_tag_from_image(claims.sub, id, tag_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
