use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
}

/// Per-endpoint failure isolator. CLOSED passes calls through; once
/// `failures` reaches `failure_threshold` it trips OPEN and fails fast for
/// `recovery_timeout`, after which a single HALF_OPEN trial is admitted.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Returns whether a call may proceed, transitioning OPEN -> HALF_OPEN
    /// if the recovery timeout has elapsed.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed() >= self.recovery_timeout).unwrap_or(false);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!(breaker = %self.name, "circuit entering half-open");
                    true
                } else {
                    false
                }
            }
            CircuitState::Closed | CircuitState::HalfOpen => true,
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == CircuitState::HalfOpen {
            tracing::info!(breaker = %self.name, "circuit recovered, closing");
        }
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures += 1;
        if inner.failures >= self.failure_threshold {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            tracing::error!(
                breaker = %self.name,
                failures = inner.failures,
                "circuit breaker tripped, entering open"
            );
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
        tracing::info!(breaker = %self.name, "circuit breaker manually reset");
    }
}

/// Process-wide, string-keyed registry of breakers so agents and call-sites
/// can share state per external-service identifier, and tests can reset
/// individual breakers without tearing down the whole process.
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &self,
        name: &str,
        failure_threshold: u32,
        recovery_timeout: Duration,
    ) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, failure_threshold, recovery_timeout)))
            .clone()
    }

    pub fn reset(&self, name: &str) {
        if let Some(breaker) = self.breakers.lock().unwrap().get(name) {
            breaker.reset();
        }
    }

    pub fn reset_all(&self) {
        for breaker in self.breakers.lock().unwrap().values() {
            breaker.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_open_after_threshold_failures() {
        let breaker = CircuitBreaker::new("quote-source", 3, Duration::from_millis(50));
        assert!(breaker.can_execute());
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.can_execute());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn half_opens_after_recovery_timeout_then_closes_on_success() {
        let breaker = CircuitBreaker::new("sentiment-source", 1, Duration::from_millis(10));
        breaker.record_failure();
        assert!(!breaker.can_execute());
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_and_resets_timer() {
        let breaker = CircuitBreaker::new("history-source", 1, Duration::from_millis(10));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.can_execute());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn registry_shares_state_by_name() {
        let registry = CircuitBreakerRegistry::new();
        let a = registry.get_or_create("llm-a", 2, Duration::from_secs(1));
        a.record_failure();
        let b = registry.get_or_create("llm-a", 2, Duration::from_secs(1));
        assert_eq!(b.state(), CircuitState::Closed);
        b.record_failure();
        assert_eq!(a.state(), CircuitState::Open);
    }

    #[test]
    fn reset_all_clears_every_breaker() {
        let registry = CircuitBreakerRegistry::new();
        let a = registry.get_or_create("a", 1, Duration::from_secs(60));
        a.record_failure();
        assert_eq!(a.state(), CircuitState::Open);
        registry.reset_all();
        assert_eq!(a.state(), CircuitState::Closed);
    }
}
