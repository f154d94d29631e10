use std::future::Future;
use std::time::Duration;

use crate::ReliabilityFailure;

/// Implemented by the error type of the call being retried so the retry
/// loop can decide whether to retry, at what status code, and whether the
/// failure carries its own `Retry-After` delay.
pub trait Attemptable: std::fmt::Display {
    fn is_retryable(&self) -> bool;
    fn status_code(&self) -> Option<u16> {
        None
    }
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
            retryable_status_codes: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    fn is_retryable_status(&self, code: u16) -> bool {
        self.retryable_status_codes.contains(&code)
    }
}

/// Retries `f` with exponential backoff. Non-retryable errors short-circuit
/// immediately; a `Retry-After` carried on the error overrides the computed
/// delay for that attempt.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut f: F,
) -> Result<T, ReliabilityFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Attemptable,
{
    let mut delay = policy.initial_delay;
    let mut last_error = String::new();

    for attempt in 0..=policy.max_retries {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(attempt, "recovered after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                let retryable = err.is_retryable()
                    || err.status_code().is_some_and(|c| policy.is_retryable_status(c));
                last_error = err.to_string();

                if !retryable {
                    tracing::warn!(%err, "non-retryable error, failing immediately");
                    return Err(ReliabilityFailure::RetriesExhausted {
                        attempts: attempt + 1,
                        last_error,
                    });
                }

                if attempt < policy.max_retries {
                    let wait = err.retry_after().unwrap_or(delay);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = policy.max_retries,
                        delay_ms = wait.as_millis() as u64,
                        %err,
                        "retrying after failure"
                    );
                    tokio::time::sleep(wait).await;
                    delay = Duration::from_secs_f64(
                        (delay.as_secs_f64() * policy.backoff_factor)
                            .min(policy.max_delay.as_secs_f64()),
                    );
                } else {
                    tracing::error!(attempts = attempt + 1, %err, "retries exhausted");
                }
            }
        }
    }

    Err(ReliabilityFailure::RetriesExhausted {
        attempts: policy.max_retries + 1,
        last_error,
    })
}

/// Runs `f`; on any failure substitutes `default()`.
pub async fn fallback<T, E, F, Fut, D>(f: F, default: D) -> T
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    D: FnOnce() -> T,
{
    match f().await {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(%err, "falling back to default value");
            default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct FlakyError(bool, u16);
    impl std::fmt::Display for FlakyError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky error (status {})", self.1)
        }
    }
    impl Attemptable for FlakyError {
        fn is_retryable(&self) -> bool {
            self.0
        }
        fn status_code(&self) -> Option<u16> {
            Some(self.1)
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..Default::default()
        };
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FlakyError(true, 503))
                } else {
                    Ok::<_, FlakyError>(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FlakyError(false, 400)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_retries_and_reports_attempts() {
        let policy = RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FlakyError(true, 500)) }
        })
        .await;
        match result {
            Err(ReliabilityFailure::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fallback_substitutes_default_on_error() {
        let value = fallback(
            || async { Err::<i32, FlakyError>(FlakyError(false, 500)) },
            || -1,
        )
        .await;
        assert_eq!(value, -1);
    }
}
