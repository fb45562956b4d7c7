//! Exponential-backoff retry combinator.
//!
//! Used at both unreliable boundaries: the extraction client wraps each
//! fetch in [`retry`], and the resolver wraps title generation with the
//! policy reported by the active backend.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::AppError;

/// Exponential backoff policy.
///
/// Delay after the n-th failed attempt is `min_delay * 2^(n-1)`, capped at
/// `max_delay`. `max_attempts` counts the first call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    /// 1s doubling up to 10s, 10 attempts.
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_attempts: 10,
        }
    }
}

impl RetryPolicy {
    pub fn new(min_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
            max_attempts: max_attempts.max(1),
        }
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_attempts: 1,
        }
    }

    /// Delay to wait after the given failed attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.min_delay.saturating_mul(1u32 << exponent);
        std::cmp::min(delay, self.max_delay)
    }
}

/// Terminal failure of a retried operation.
#[derive(Debug)]
pub struct RetryError {
    /// Number of attempts actually made.
    pub attempts: u32,
    /// The error of the last attempt.
    pub error: AppError,
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempt ceiling is reached.
///
/// Both the operation and the backoff sleeps race against `cancel`; a
/// cancelled run ends with [`AppError::Cancelled`].
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(AppError::Cancelled),
            result = operation() => result,
        };

        let error = match result {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(%label, attempt, "Recovered after retries");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !error.is_retryable() || attempt >= policy.max_attempts {
            return Err(RetryError {
                attempts: attempt,
                error,
            });
        }

        let delay = policy.delay_for_attempt(attempt);
        tracing::warn!(
            %label,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Attempt failed, retrying"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(RetryError {
                    attempts: attempt,
                    error: AppError::Cancelled,
                });
            }
            () = tokio::time::sleep(delay) => {}
        }
    }
}
