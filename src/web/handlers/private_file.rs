//! Private file handlers.

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Json,
};
use std::sync::Arc;

use crate::files::{PrivateFileUpdate, PrivateUpload};
use crate::web::dto::{
    ApiResponse, BatchResponse, FilePasswordQuery, PrivateFileResponse, UpdatePrivateFileRequest,
    ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::middleware::AuthUser;

use super::{parse_id, read_batch, read_upload, AppState};

/// Header carrying the password of an encrypted file.
pub const HEADER_FILE_PASSWORD: &str = "x-file-password";

/// File password from the query or the `X-File-Password` header.
fn file_password(query: FilePasswordQuery, headers: &HeaderMap) -> Option<String> {
    query.password.filter(|p| !p.is_empty()).or_else(|| {
        headers
            .get(HEADER_FILE_PASSWORD)
            .and_then(|v| v.to_str().ok())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
    })
}

fn content_disposition_header(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            _ => c,
        })
        .collect();
    format!("attachment; filename=\"{}\"", sanitized)
}

/// POST /api/private-files - Upload a private file.
///
/// Request body: multipart/form-data with "file" and an optional "password"
/// that encrypts the stored copy.
pub async fn upload_private_file(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<PrivateFileResponse>>), ApiError> {
    let form = read_upload(multipart).await?;
    let file = state
        .private_files()
        .upload(
            claims.sub,
            PrivateUpload {
                filename: form.filename,
                bytes: form.bytes,
                mime_type: form.content_type,
                password: form.password,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::new(file.into()))))
}

/// POST /api/private-files/batch - Upload several private files at once.
///
/// Request body: multipart/form-data with one "files[]" part per file and
/// an optional "password" that encrypts every one of them.
pub async fn batch_upload_private_files(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    multipart: Multipart,
) -> Result<Json<ApiResponse<BatchResponse<PrivateFileResponse>>>, ApiError> {
    let form = read_batch(multipart, state.config.storage.max_batch_files).await?;
    let service = state.private_files();

    let mut outcomes = Vec::with_capacity(form.files.len());
    for file in form.files {
        let filename = file.filename.clone();
        let outcome = service
            .upload(
                claims.sub,
                PrivateUpload {
                    filename: file.filename,
                    bytes: file.bytes,
                    mime_type: file.content_type,
                    password: form.password.clone(),
                },
            )
            .await
            .map(PrivateFileResponse::from)
            .map_err(ApiError::from);
        outcomes.push((filename, outcome));
    }

    let batch = BatchResponse::new(outcomes);
    tracing::info!(
        user_id = claims.sub,
        total = batch.total,
        succeeded = batch.success_count,
        "private file batch uploaded"
    );
    Ok(Json(ApiResponse::new(batch)))
}

/// GET /api/private-files - The caller's private files.
pub async fn list_private_files(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ApiResponse<Vec<PrivateFileResponse>>>, ApiError> {
    let files = state.private_files().list(claims.sub).await?;
    Ok(Json(ApiResponse::new(
        files.into_iter().map(PrivateFileResponse::from).collect(),
    )))
}

/// GET /api/private-files/:id - File metadata. Encrypted files need the password.
pub async fn get_private_file(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    Query(query): Query<FilePasswordQuery>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<PrivateFileResponse>>, ApiError> {
    let id = parse_id(&id)?;
    let password = file_password(query, &headers);
    let file = state
        .private_files()
        .get_file(id, claims.sub, password.as_deref())
        .await?;
    Ok(Json(ApiResponse::new(file.into())))
}

/// GET /api/private-files/:id/download - File content, decrypted if needed.
pub async fn download_private_file(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    Query(query): Query<FilePasswordQuery>,
    headers: HeaderMap,
) -> Result<Response<Body>, ApiError> {
    let id = parse_id(&id)?;
    let password = file_password(query, &headers);
    let decrypted = state
        .private_files()
        .decrypted_path(id, claims.sub, password.as_deref())
        .await?;

    let (file, content) = decrypted.into_content().await.map_err(|e| {
        tracing::error!("Failed to load file: {}", e);
        ApiError::internal("Failed to load file")
    })?;

    Response::builder()
        .header(header::CONTENT_TYPE, file.mime_type.as_str())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(&format!("{}.{}", file.name, file.ext)),
        )
        .header(header::CONTENT_LENGTH, content.len())
        .body(Body::from(content))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })
}

/// PUT /api/private-files/:id - Rename and/or change encryption.
pub async fn update_private_file(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdatePrivateFileRequest>,
) -> Result<Json<ApiResponse<PrivateFileResponse>>, ApiError> {
    let id = parse_id(&id)?;
    let update = PrivateFileUpdate {
        name: req.name,
        encryption: req.encryption.map(Into::into),
    };
    let file = state
        .private_files()
        .update(id, claims.sub, update)
        .await?;
    Ok(Json(ApiResponse::new(file.into())))
}

/// DELETE /api/private-files/:id - Delete one of the caller's files.
pub async fn delete_private_file(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state.private_files().delete(id, claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_file_password_sources() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_FILE_PASSWORD, HeaderValue::from_static("from-header"));

        let query = FilePasswordQuery {
            password: Some("from-query".to_string()),
        };
        assert_eq!(file_password(query, &headers).as_deref(), Some("from-query"));
        assert_eq!(
            file_password(FilePasswordQuery::default(), &headers).as_deref(),
            Some("from-header")
        );
        assert_eq!(file_password(FilePasswordQuery::default(), &HeaderMap::new()), None);
    }

    #[test]
    fn test_content_disposition_header() {
        assert_eq!(
            content_disposition_header("report.pdf"),
            "attachment; filename=\"report.pdf\""
        );
        assert_eq!(
            content_disposition_header("a\"b\r\n.txt"),
            "attachment; filename=\"a_b.txt\""
        );
    }
}
