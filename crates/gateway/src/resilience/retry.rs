//! Retry logic with exponential backoff for transient failures.
//!
//! Provider sub-calls are retried as a unit. The schedule lives in
//! [`RetryConfig`]; whether a failure is worth retrying is decided by the
//! error itself through [`Retryable`], or by an explicit predicate.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try.
    pub max_retries: u32,
    /// Base delay between retries (doubled per attempt).
    #[serde(with = "crate::serde_millis")]
    pub base_delay: Duration,
    /// Upper bound for any single delay, including `Retry-After` hints.
    #[serde(with = "crate::serde_millis")]
    pub max_delay: Duration,
    /// Whether to add up to 50% random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No retries at all; the first failure is final.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait after failed attempt number `attempt` (0-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let max = self.max_delay.as_millis() as u64;
        let mut delay = base.saturating_mul(factor).min(max);

        if self.jitter && delay > 0 {
            delay = delay.saturating_add(fastrand::u64(0..=delay / 2)).min(max);
        }

        Duration::from_millis(delay)
    }
}

/// Errors that know whether repeating the operation could help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Server-provided minimum wait (e.g. a `Retry-After` header).
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Result of a retry operation.
#[derive(Debug, Clone)]
pub struct RetryResult<T, E> {
    /// The final result (Ok if any attempt succeeded, otherwise the last error).
    pub result: Result<T, E>,
    /// Number of attempts made (1 = no retries needed).
    pub attempts: u32,
    /// Total duration spent on all attempts, including backoff sleeps.
    pub total_duration: Duration,
}

impl<T, E> RetryResult<T, E> {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Execute an async operation, retrying failures the error marks retryable.
///
/// ```ignore
/// let outcome = execute_with_retry_async(&RetryConfig::default(), |attempt| async move {
///     provider.embed(&inputs).await
/// })
/// .await;
/// ```
pub async fn execute_with_retry_async<T, E, F, Fut>(
    config: &RetryConfig,
    operation: F,
) -> RetryResult<T, E>
where
    E: Retryable,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    execute_with_retry_if(config, operation, |err: &E| {
        (err.is_retryable(), err.retry_after())
    })
    .await
}

/// Like [`execute_with_retry_async`], but never starts a backoff sleep that
/// would end at or after `deadline`; the last error is returned instead.
pub async fn execute_with_retry_before<T, E, F, Fut>(
    config: &RetryConfig,
    deadline: Instant,
    operation: F,
) -> RetryResult<T, E>
where
    E: Retryable,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_loop(config, Some(deadline), operation, |err: &E| {
        (err.is_retryable(), err.retry_after())
    })
    .await
}

/// Like [`execute_with_retry_async`] with an explicit predicate returning
/// `(retry?, minimum wait)` for each failure.
pub async fn execute_with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation: F,
    should_retry: P,
) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> (bool, Option<Duration>),
{
    retry_loop(config, None, operation, should_retry).await
}

async fn retry_loop<T, E, F, Fut, P>(
    config: &RetryConfig,
    deadline: Option<Instant>,
    mut operation: F,
    mut should_retry: P,
) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> (bool, Option<Duration>),
{
    let start = Instant::now();
    let mut attempt = 0u32;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                return RetryResult {
                    result: Ok(value),
                    attempts: attempt + 1,
                    total_duration: start.elapsed(),
                };
            }
            Err(error) => {
                let (retry, hint) = should_retry(&error);
                let mut delay = config.delay_for(attempt);
                if let Some(hint) = hint {
                    delay = delay.max(hint).min(config.max_delay);
                }
                let mut give_up = !retry || attempt >= config.max_retries;
                if !give_up && deadline.is_some_and(|d| Instant::now() + delay >= d) {
                    tracing::debug!(attempt, "no time left for another attempt");
                    give_up = true;
                }

                if give_up {
                    return RetryResult {
                        result: Err(error),
                        attempts: attempt + 1,
                        total_duration: start.elapsed(),
                    };
                }

                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
