//! API error types with the JSON error envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::certification::ReadinessReport;
use crate::core_state::CoreError;
use crate::error::AppError;
use crate::storage::StorageError;

/// `{success: false, error, message, details?}`
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Certification blocked")]
    Blocked(Box<ReadinessReport>),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            ApiError::Unauthorized(detail) => (StatusCode::UNAUTHORIZED, "AUTH_REQUIRED", detail, None),
            ApiError::Forbidden(detail) => (StatusCode::FORBIDDEN, "FORBIDDEN", detail, None),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail, None),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail, None),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "CONFLICT", detail, None),
            ApiError::Blocked(report) => (
                StatusCode::CONFLICT,
                "CERTIFICATION_BLOCKED",
                format!("{} blocker(s) prevent certification", report.blockers.len()),
                serde_json::to_value(&*report).ok(),
            ),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorBody {
            success: false,
            error: code,
            message,
            details,
        };
        (status, Json(body)).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(m) => ApiError::BadRequest(m),
            AppError::Transform(e) => ApiError::BadRequest(e.to_string()),
            AppError::NotFound(m) => ApiError::NotFound(m),
            AppError::AccessDenied(m) => ApiError::Forbidden(m),
            AppError::StateConflict(m) => ApiError::Conflict(m),
            e @ AppError::InvalidTransition { .. } => ApiError::Conflict(e.to_string()),
            AppError::CertificationBlocked(report) => ApiError::Blocked(report),
            AppError::Storage(e) => e.into(),
            e @ (AppError::RemoteService(_) | AppError::Database(_) | AppError::AuditWrite(_)) => {
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => ApiError::NotFound(format!("object {key}")),
            StorageError::Expired | StorageError::BadSignature => ApiError::Forbidden(err.to_string()),
            StorageError::InvalidKey(_) => ApiError::BadRequest(err.to_string()),
            StorageError::AlreadyExists(_) => ApiError::Conflict(err.to_string()),
            StorageError::Io(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
