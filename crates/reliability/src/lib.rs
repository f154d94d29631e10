//! Reliability wrappers for external calls: retry with backoff, fallback,
//! and a per-endpoint circuit breaker.

mod breaker;
mod retry;

pub use breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use retry::{fallback, retry_with_backoff, Attemptable, RetryPolicy};

use thiserror::Error;

/// Failure taxonomy surfaced by this crate instead of raising exceptions.
#[derive(Debug, Error, Clone)]
pub enum ReliabilityFailure {
    #[error("operation timed out")]
    Timeout,
    #[error("circuit breaker '{0}' is open")]
    CircuitOpen(String),
    #[error("non-retryable status {0}")]
    BadStatus(u16),
    #[error("malformed reply: {0}")]
    Malformed(String),
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}
