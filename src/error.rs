//! Service-level error taxonomy shared by the pipeline, the certification
//! gate and the HTTP layer.

use thiserror::Error;

use crate::certification::ReadinessReport;
use crate::db::DatabaseError;
use crate::ocr::OcrError;
use crate::pipeline::transform::TransformError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum AppError {
    /// Bad input shape. Never retried.
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Cross-tenant access or a role lacking the permission.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Already processing, already audited, frozen application, ...
    #[error("Conflict: {0}")]
    StateConflict(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("Remote service error: {0}")]
    RemoteService(#[from] OcrError),

    #[error("Certification blocked by {} issue(s)", .0.blockers.len())]
    CertificationBlocked(Box<ReadinessReport>),

    #[error("Database error: {0}")]
    Database(DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A mutation could not record its audit entry; the enclosing unit of work aborts.
    #[error("Audit trail write failed: {0}")]
    AuditWrite(String),
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => {
                AppError::NotFound(format!("{entity_type} {id}"))
            }
            other => AppError::Database(other),
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(DatabaseError::Sqlite(err))
    }
}

impl AppError {
    pub fn transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        AppError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
