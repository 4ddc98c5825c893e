// Retry-with-backoff for outbound requests.
//
// Exponential backoff with a delay cap and additive jitter. Which failures are
// worth another attempt is decided by a caller-supplied classifier.

use rand::RngExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Base delay. The delay before retry `n` (0-indexed) is `base * 2^n`.
    pub base_delay_ms: u64,
    /// Cap applied to the exponential part of the delay.
    pub max_delay_ms: u64,
    /// Upper bound (exclusive) of the uniform jitter added on top of the capped delay.
    pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 500,
            max_delay_ms: 15_000,
            max_jitter_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps. Useful for tests and local stubs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            max_jitter_ms: 0,
        }
    }

    /// Delay before the retry that follows failed attempt `attempt` (0-indexed),
    /// without jitter.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        // 2^attempt saturates instead of overflowing for large attempt numbers.
        let multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let exp_ms = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(exp_ms.min(self.max_delay_ms))
    }

    /// Backoff plus uniform jitter in `[0, max_jitter_ms)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let capped = self.backoff_for_attempt(attempt);
        if self.max_jitter_ms == 0 {
            return capped;
        }
        let jitter_ms = rand::rng().random_range(0..self.max_jitter_ms);
        capped + Duration::from_millis(jitter_ms)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Why [`retry_with_backoff`] gave up.
#[derive(Debug, Error)]
pub enum RetryError<E: fmt::Display> {
    /// The classifier rejected the error; no further attempts were made.
    #[error("{0}")]
    Permanent(E),
    /// Every attempt failed with a transient error.
    #[error("max retries reached after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E: fmt::Display> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            Self::Permanent(err) => err,
            Self::Exhausted { last, .. } => last,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently or runs out of attempts.
///
/// `operation` receives the 0-indexed attempt number. `is_transient` decides
/// whether a failure is retried. No sleep follows the final attempt.
pub async fn retry_with_backoff<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    is_transient: C,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
{
    let attempts = policy.attempts();
    let mut attempt = 0;
    loop {
        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !is_transient(&err) {
            return Err(RetryError::Permanent(err));
        }

        attempt += 1;
        if attempt >= attempts {
            return Err(RetryError::Exhausted {
                attempts,
                last: err,
            });
        }

        let delay = policy.delay_for_attempt(attempt - 1);
        warn!(
            attempt,
            max = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying after transient error"
        );
        tokio::time::sleep(delay).await;
    }
}
