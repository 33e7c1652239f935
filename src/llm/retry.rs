use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tracing::{error, warn};

use super::LlmError;
use crate::config::LlmConfig;

/// Retry budget for a single stage call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, first call included
    pub max_attempts: u32,
    /// Backoff grows as unit * 2^attempt
    pub backoff_unit: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_millis(1000),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_unit: Duration::from_millis(config.backoff_unit_ms),
            max_backoff: Duration::from_secs(config.max_backoff_seconds),
        }
    }

    /// Waits between attempts; one fewer than the attempt budget
    fn backoff_schedule(&self) -> impl Iterator<Item = Duration> {
        let unit_ms = u64::try_from(self.backoff_unit.as_millis()).unwrap_or(u64::MAX).max(1);
        ExponentialBackoff::from_millis(2)
            .factor(unit_ms)
            .max_delay(self.max_backoff)
            .map(jitter)
            .take(self.max_attempts.saturating_sub(1) as usize)
    }
}

/// Run `operation`, retrying transient failures within the policy's budget.
///
/// A provider-suggested delay replaces the computed backoff for that wait.
/// Non-transient errors are returned at once.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut schedule = policy.backoff_schedule();
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                let Some(backoff) = schedule.next() else {
                    error!(call = label, attempts = attempt, error = %e, "Retry budget exhausted");
                    return Err(e);
                };
                let delay = e.suggested_delay().unwrap_or(backoff);
                warn!(
                    call = label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Transient generation failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!(call = label, attempt, error = %e, "Non-retryable generation failure");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_unit: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry(&fast_policy(), "test", || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(LlmError::Network("connection reset".to_string()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_is_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = with_retry(&fast_policy(), "test", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::RateLimited { retry_after: None })
            }
        })
        .await;

        assert!(matches!(result, Err(LlmError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_hard_failure_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = with_retry(&fast_policy(), "test", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::Api {
                    status_code: 400,
                    message: "bad request".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(LlmError::Api { status_code: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_suggested_delay_is_honored() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let started = tokio::time::Instant::now();

        let result = with_retry(&fast_policy(), "test", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(LlmError::RateLimited { retry_after: Some(20) })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert!(started.elapsed() >= Duration::from_secs(20));
    }

    #[test]
    fn test_single_attempt_policy_has_no_backoff() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_schedule().count(), 0);
        assert_eq!(RetryPolicy::default().backoff_schedule().count(), 2);
    }
}
