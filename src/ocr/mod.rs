//! Client side of the remote OCR/layout engine: job submission, status
//! polling and retry with backoff.
//!
//! The engine itself is opaque. Everything here talks to it through the
//! `OcrService` trait so the processor can be driven by a mock in tests.

pub mod client;
pub mod retry;

pub use client::{HttpOcrService, OcrClient, PollSettings};
pub use retry::{with_retry, RetryPolicy};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::enums::DocumentType;
use crate::pipeline::normalize::RawOcrOutput;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OcrError {
    #[error("OCR request timed out: {0}")]
    Timeout(String),

    #[error("OCR service unreachable at {0}")]
    ConnectionRefused(String),

    #[error("OCR service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("OCR response could not be read: {0}")]
    MalformedResponse(String),

    #[error("OCR job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    #[error("OCR job {job_id} still running after {polls} polls")]
    PollExhausted { job_id: String, polls: u32 },

    #[error("OCR client error: {0}")]
    Client(String),
}

impl OcrError {
    /// Timeouts, refused connections, 5xx and 429 are worth another attempt.
    /// Other 4xx, unreadable bodies and failed jobs are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            OcrError::Timeout(_) | OcrError::ConnectionRefused(_) => true,
            OcrError::Http { status, .. } => *status == 429 || (500..600).contains(status),
            OcrError::PollExhausted { .. } => true,
            OcrError::MalformedResponse(_) | OcrError::JobFailed { .. } | OcrError::Client(_) => {
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Body of `GET {base}/jobs/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub status: JobState,
    #[serde(default)]
    pub result: Option<RawOcrOutput>,
    #[serde(default)]
    pub error: Option<String>,
}

/// The remote job service. Implementations make exactly one request per call;
/// retry and polling live in `OcrClient`.
pub trait OcrService: Send + Sync {
    /// Submit a document and return the engine's job id.
    fn submit_job(&self, doc_type: DocumentType, content: &[u8]) -> Result<String, OcrError>;

    fn job_status(&self, job_id: &str) -> Result<JobStatus, OcrError>;
}
