//! API error type and its JSON rendering.
//!
//! Every failed request answers with
//! `{"error": {"code": "...", "message": "...", "details": {...}}}`.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::HostError;

/// Per-field validation messages.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    Forbidden,
    /// An encrypted file was opened with a wrong or missing password.
    WrongPassword,
    NotFound,
    Conflict,
    PayloadTooLarge,
    /// Field-level failures; `details` is populated.
    ValidationError,
    UnprocessableEntity,
    InternalError,
}

impl ErrorCode {
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::WrongPassword => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ValidationError | Self::UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    error: Body<'a>,
}

#[derive(Serialize)]
struct Body<'a> {
    code: ErrorCode,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a FieldErrors>,
}

/// Error returned by handlers and extractors.
#[derive(Debug, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    details: Option<FieldErrors>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&FieldErrors> {
        self.details.as_ref()
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnprocessableEntity, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Field-level failures reported by `validator`.
    pub fn from_validation_errors(errors: validator::ValidationErrors) -> Self {
        let details: FieldErrors = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let messages = errs
                    .iter()
                    .map(|e| match &e.message {
                        Some(m) => m.to_string(),
                        None => format!("invalid {field}"),
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();

        Self {
            code: ErrorCode::ValidationError,
            message: "Validation failed".to_string(),
            details: Some(details),
        }
    }

    /// A multipart read failure. Bodies over the size limit become 413.
    pub fn from_multipart(err: MultipartError, what: &str) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::new(ErrorCode::PayloadTooLarge, "Upload too large");
        }
        tracing::debug!("Failed to read {}: {}", what, err.body_text());
        Self::bad_request(format!("Invalid {what}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = Envelope {
            error: Body {
                code: self.code,
                message: &self.message,
                details: self.details.as_ref(),
            },
        };
        (self.code.status_code(), Json(envelope)).into_response()
    }
}

impl From<HostError> for ApiError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::InvalidInput(msg) => Self::bad_request(msg),
            HostError::Validation(msg) => Self::unprocessable(msg),
            HostError::AlreadyExists(what) => Self::conflict(format!("{what} already exists")),
            HostError::Unauthenticated(msg) => Self::unauthorized(msg),
            HostError::PermissionDenied { permission } => {
                Self::forbidden(format!("missing permission: {permission}"))
            }
            HostError::NotFound(what) => Self::not_found(format!("{what} not found")),
            HostError::WrongPassword => Self::new(ErrorCode::WrongPassword, "wrong file password"),
            other => {
                tracing::error!(error = %other, "internal error");
                Self::internal("An internal error occurred")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_from_host_error() {
        let cases = [
            (HostError::InvalidInput("id".into()), StatusCode::BAD_REQUEST),
            (HostError::Validation("too large".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (HostError::AlreadyExists("image".into()), StatusCode::CONFLICT),
            (HostError::Unauthenticated("expired".into()), StatusCode::UNAUTHORIZED),
            (HostError::permission_denied("upload_file"), StatusCode::FORBIDDEN),
            (HostError::NotFound("file".into()), StatusCode::NOT_FOUND),
            (HostError::WrongPassword, StatusCode::FORBIDDEN),
            (HostError::Storage("disk full".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (HostError::Database("locked".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).code().status_code(), status);
        }
        assert_eq!(
            ApiError::from(HostError::WrongPassword).code(),
            ErrorCode::WrongPassword
        );
    }

    #[test]
    fn test_permission_denied_names_permission() {
        let err = ApiError::from(HostError::permission_denied("delete_file"));
        assert!(err.message().contains("delete_file"));
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = ApiError::from(HostError::Storage("/srv/data/images/x.jpg".into()));
        assert!(!err.message().contains("/srv"));
    }

    #[derive(Validate)]
    struct Named {
        #[validate(length(min = 3, message = "too short"))]
        name: String,
    }

    #[test]
    fn test_validation_details() {
        let errors = Named {
            name: "ab".to_string(),
        }
        .validate()
        .unwrap_err();

        let err = ApiError::from_validation_errors(errors);
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(err.message(), "Validation failed");
        assert_eq!(err.details().unwrap()["name"], vec!["too short".to_string()]);
    }

    #[test]
    fn test_display() {
        let err = ApiError::not_found("image not found");
        assert_eq!(err.to_string(), "NotFound: image not found");
    }
}
