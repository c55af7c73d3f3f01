//! Bounded retry with exponential backoff and proportional jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::OcrError;

/// Backoff parameters for remote calls.
///
/// `delay(attempt) = min(base_delay_ms * 2^attempt, max_delay_ms) * (1 ± jitter_ratio)`,
/// clamped again to `max_delay_ms` so the cap is hard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of the delay added or removed at random, in [0, 1].
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            jitter_ratio: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay after the given zero-based failed attempt.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    pub fn delay_with<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal_delay(attempt).as_millis() as f64;
        let ratio = self.jitter_ratio.clamp(0.0, 1.0);
        let factor = if ratio > 0.0 {
            rng.gen_range(1.0 - ratio..=1.0 + ratio)
        } else {
            1.0
        };
        let ms = ((nominal * factor).round() as u64).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent. `sleep` is called between attempts.
pub fn with_retry<T, F, S>(
    policy: &RetryPolicy,
    label: &str,
    mut sleep: S,
    mut op: F,
) -> Result<T, OcrError>
where
    F: FnMut() -> Result<T, OcrError>,
    S: FnMut(Duration),
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                let delay = policy.delay(attempt);
                tracing::warn!(
                    call = label,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "OCR call failed, retrying"
                );
                sleep(delay);
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(call = label, attempts, error = %e, "OCR retries exhausted");
                }
                return Err(e);
            }
        }
    }
}
