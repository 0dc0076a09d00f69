//! Public image handlers.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::files::ImageUpload;
use crate::web::dto::{ApiResponse, BatchResponse, ImageResponse};
use crate::web::error::ApiError;
use crate::web::middleware::AuthUser;

use super::{parse_id, read_batch, read_upload, AppState};

/// POST /api/images - Upload an image.
///
/// Request body: multipart/form-data with "file" and optional "description" fields.
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<ImageResponse>>), ApiError> {
    let form = read_upload(multipart).await?;
    let uploaded = state
        .images()
        .upload(
            claims.sub,
            ImageUpload {
                filename: form.filename,
                bytes: form.bytes,
                description: form.description.unwrap_or_default(),
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(ImageResponse::new(
            uploaded.image,
            uploaded.url,
        ))),
    ))
}

/// POST /api/images/batch - Upload several images at once.
///
/// Request body: multipart/form-data with one "files[]" part per image and
/// an optional "description" shared by all. Each file succeeds or fails on
/// its own; the response lists the outcome per file.
pub async fn batch_upload_images(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    multipart: Multipart,
) -> Result<Json<ApiResponse<BatchResponse<ImageResponse>>>, ApiError> {
    let form = read_batch(multipart, state.config.storage.max_batch_files).await?;
    let description = form.description.unwrap_or_default();
    let service = state.images();

    let mut outcomes = Vec::with_capacity(form.files.len());
    for file in form.files {
        let filename = file.filename.clone();
        let outcome = service
            .upload(
                claims.sub,
                ImageUpload {
                    filename: file.filename,
                    bytes: file.bytes,
                    description: description.clone(),
                },
            )
            .await
            .map(|uploaded| ImageResponse::new(uploaded.image, uploaded.url))
            .map_err(ApiError::from);
        outcomes.push((filename, outcome));
    }

    let batch = BatchResponse::new(outcomes);
    tracing::info!(
        user_id = claims.sub,
        total = batch.total,
        succeeded = batch.success_count,
        "image batch uploaded"
    );
    Ok(Json(ApiResponse::new(batch)))
}

/// GET /api/images - Images uploaded by the caller.
pub async fn list_images(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ApiResponse<Vec<ImageResponse>>>, ApiError> {
    let service = state.images();
    let images = service
        .list(claims.sub)
        .await?
        .into_iter()
        .map(|image| {
            let url = service.url_for(&image);
            ImageResponse::new(image, url)
        })
        .collect();
    Ok(Json(ApiResponse::new(images)))
}

/// GET /api/images/:id - Image metadata. Counts a view.
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ImageResponse>>, ApiError> {
    let id = parse_id(&id)?;
    let service = state.images();
    let image = service.get(id).await?;
    let url = service.url_for(&image);
    Ok(Json(ApiResponse::new(ImageResponse::new(image, url))))
}

/// DELETE /api/images/:id - Delete one of the caller's images.
pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state.images().delete(id, claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}
