//! Usage: Generic retry-with-backoff for transient backend/network failures.
//!
//! Transient errors are recognized by their text, not their type: every layer
//! of the backend stack (HTTP client, hosted API, OS sockets) reports network
//! trouble with a small shared vocabulary, and anything outside it is treated
//! as fatal and propagated on first occurrence.

pub mod batch;

use std::future::Future;
use std::time::Duration;

use crate::shared::error::{codes, AppError, AppResult};

/// Error texts containing any of these markers are classified transient.
const TRANSIENT_MARKERS: &[&str] = &[
    "disconnect",
    "disconnected",
    "timeout",
    "timed out",
    "connection",
    "network",
    "unavailable",
    "unreachable",
    "refused",
    "reset",
    "broken pipe",
    "aborted",
    "temporary failure",
    "service unavailable",
    "gateway timeout",
    "bad gateway",
];

/// Case-insensitive transient/fatal classification of an error's text.
pub fn is_transient_error_text(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    TRANSIENT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Immutable retry schedule: total attempt count plus exponential delays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay: base_delay.max(Duration::from_millis(1)),
            backoff_multiplier: backoff_multiplier.max(1.0),
        }
    }

    /// 2 attempts, 1s base, 1.5x growth.
    pub fn quick() -> Self {
        Self::new(2, Duration::from_secs_f64(1.0), 1.5)
    }

    /// 3 attempts, 2s base, 1.5x growth. The default for backend calls.
    pub fn standard() -> Self {
        Self::new(3, Duration::from_secs_f64(2.0), 1.5)
    }

    /// 4 attempts, 3s base, 2x growth.
    pub fn patient() -> Self {
        Self::new(4, Duration::from_secs_f64(3.0), 2.0)
    }

    /// 5 attempts, 5s base, 2x growth.
    pub fn critical() -> Self {
        Self::new(5, Duration::from_secs_f64(5.0), 2.0)
    }

    /// Delay slept after failed attempt `attempt_index` (0-based):
    /// `base_delay * backoff_multiplier^attempt_index`.
    pub(crate) fn delay_after(&self, attempt_index: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt_index.min(20) as i32);
        self.base_delay.mul_f64(factor)
    }
}

/// Runs `op`, retrying transient failures with exponential backoff.
///
/// Fatal failures and the final attempt's failure propagate immediately
/// without sleeping. The delay suspends only the calling task.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    for attempt in 0..policy.max_retries {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let final_attempt = attempt + 1 >= policy.max_retries;
                if !is_transient_error_text(&err.to_string()) {
                    return Err(err);
                }
                if final_attempt {
                    tracing::warn!(
                        attempts = policy.max_retries,
                        error = %err,
                        "transient failure persisted through all attempts"
                    );
                    return Err(err);
                }

                let delay = policy.delay_after(attempt);
                tracing::debug!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure; retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    // Only reachable when a policy bypassed the >= 1 clamp on max_retries.
    Err(AppError::new(
        codes::NO_ATTEMPTS,
        "no attempts were executed",
    ))
}
