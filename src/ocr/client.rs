use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::retry::{with_retry, RetryPolicy};
use super::{JobState, JobStatus, OcrError, OcrService};
use crate::models::enums::DocumentType;
use crate::pipeline::normalize::RawOcrOutput;

// ═══════════════════════════════════════════
// HTTP transport
// ═══════════════════════════════════════════

/// Blocking HTTP implementation of the engine's job API.
pub struct HttpOcrService {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct SubmitJobRequest<'a> {
    document_type: &'a str,
    content_base64: String,
}

#[derive(Deserialize)]
struct SubmitJobResponse {
    job_id: String,
}

impl HttpOcrService {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, OcrError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| OcrError::Client(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    fn classify(&self, e: reqwest::Error) -> OcrError {
        if e.is_timeout() {
            OcrError::Timeout(format!("no response after {}s", self.timeout_secs))
        } else if e.is_connect() {
            OcrError::ConnectionRefused(self.base_url.clone())
        } else if let Some(status) = e.status() {
            OcrError::Http {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            OcrError::Client(e.to_string())
        }
    }

    fn check_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, OcrError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(OcrError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

impl OcrService for HttpOcrService {
    fn submit_job(&self, doc_type: DocumentType, content: &[u8]) -> Result<String, OcrError> {
        let url = format!("{}/jobs", self.base_url);
        let body = SubmitJobRequest {
            document_type: doc_type.as_str(),
            content_base64: base64::engine::general_purpose::STANDARD.encode(content),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.classify(e))?;
        let parsed: SubmitJobResponse = Self::check_status(response)?
            .json()
            .map_err(|e| OcrError::MalformedResponse(e.to_string()))?;
        Ok(parsed.job_id)
    }

    fn job_status(&self, job_id: &str) -> Result<JobStatus, OcrError> {
        let url = format!("{}/jobs/{}", self.base_url, job_id);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.classify(e))?;
        Self::check_status(response)?
            .json()
            .map_err(|e| OcrError::MalformedResponse(e.to_string()))
    }
}

// ═══════════════════════════════════════════
// Job runner
// ═══════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSettings {
    pub interval_ms: u64,
    pub max_polls: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            max_polls: 90,
        }
    }
}

type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// Submit-then-poll driver around an `OcrService`, with every remote call
/// wrapped in the retry policy.
#[derive(Clone)]
pub struct OcrClient {
    service: Arc<dyn OcrService>,
    retry: RetryPolicy,
    poll: PollSettings,
    sleep: Sleeper,
}

impl OcrClient {
    pub fn new(service: Arc<dyn OcrService>, retry: RetryPolicy, poll: PollSettings) -> Self {
        Self {
            service,
            retry,
            poll,
            sleep: Arc::new(std::thread::sleep),
        }
    }

    /// Replace the blocking sleep used between retries and polls.
    pub fn with_sleeper(mut self, sleep: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleep = Arc::new(sleep);
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run one document through the engine and return its raw output.
    pub fn extract(&self, doc_type: DocumentType, content: &[u8]) -> Result<RawOcrOutput, OcrError> {
        let sleep = |d: Duration| (self.sleep)(d);

        let job_id = with_retry(&self.retry, "submit_job", sleep, || {
            self.service.submit_job(doc_type, content)
        })?;
        tracing::info!(job_id = %job_id, doc_type = %doc_type, "OCR job submitted");

        for poll in 0..self.poll.max_polls {
            let status = with_retry(&self.retry, "job_status", sleep, || {
                self.service.job_status(&job_id)
            })?;

            match status.status {
                JobState::Completed => {
                    tracing::info!(job_id = %job_id, polls = poll + 1, "OCR job completed");
                    return status.result.ok_or_else(|| {
                        OcrError::MalformedResponse(format!("job {job_id} completed without a result"))
                    });
                }
                JobState::Failed => {
                    return Err(OcrError::JobFailed {
                        job_id,
                        reason: status.error.unwrap_or_else(|| "no reason given".into()),
                    });
                }
                JobState::Pending | JobState::Processing => {
                    sleep(Duration::from_millis(self.poll.interval_ms));
                }
            }
        }

        Err(OcrError::PollExhausted {
            job_id,
            polls: self.poll.max_polls,
        })
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Scripted engine: each call pops the next canned response.
    #[derive(Default)]
    pub struct ScriptedOcr {
        pub submits: Mutex<VecDeque<Result<String, OcrError>>>,
        pub statuses: Mutex<VecDeque<Result<JobStatus, OcrError>>>,
        pub submit_calls: Mutex<u32>,
        pub status_calls: Mutex<u32>,
    }

    impl ScriptedOcr {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn submit(self, r: Result<String, OcrError>) -> Self {
            self.submits.lock().unwrap().push_back(r);
            self
        }

        pub fn status(self, r: Result<JobStatus, OcrError>) -> Self {
            self.statuses.lock().unwrap().push_back(r);
            self
        }

        pub fn completed(result: RawOcrOutput) -> JobStatus {
            JobStatus {
                status: JobState::Completed,
                result: Some(result),
                error: None,
            }
        }

        pub fn state(state: JobState) -> JobStatus {
            JobStatus {
                status: state,
                result: None,
                error: None,
            }
        }
    }

    impl OcrService for ScriptedOcr {
        fn submit_job(&self, _doc_type: DocumentType, _content: &[u8]) -> Result<String, OcrError> {
            *self.submit_calls.lock().unwrap() += 1;
            self.submits
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(OcrError::ConnectionRefused("script exhausted".into())))
        }

        fn job_status(&self, _job_id: &str) -> Result<JobStatus, OcrError> {
            *self.status_calls.lock().unwrap() += 1;
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(OcrError::ConnectionRefused("script exhausted".into())))
        }
    }
}
