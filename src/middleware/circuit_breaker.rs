use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Provider is called normally
    Closed,
    /// Provider is skipped until the cooldown elapses
    Open,
    /// One probe call is allowed to check whether the provider recovered
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed translations before the provider is skipped
    pub failure_threshold: usize,
    /// How long an open circuit stays open
    pub cooldown: Duration,
    /// Successful probes needed to close a half-open circuit
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            success_threshold: 1,
        }
    }
}

/// Per-provider circuit breaker
///
/// Only decides whether a provider in the translation chain is worth calling.
/// A skipped provider is treated like a failed one by the chain, so the
/// "source text on total failure" behavior is unaffected.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    inner: Arc<RwLock<CircuitBreakerInner>>,
    config: CircuitBreakerConfig,
}

struct CircuitBreakerInner {
    state: CircuitState,
    consecutive_failures: usize,
    consecutive_successes: usize,
    opened_at: Option<Instant>,
    /// A half-open probe has been handed out and not yet reported
    probe_in_flight: bool,
    total_failures: usize,
    total_successes: usize,
    trips: usize,
}

impl CircuitBreaker {
    pub fn new(name: &str) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    pub fn with_config(name: &str, config: CircuitBreakerConfig) -> Self {
        Self {
            name: Arc::from(name),
            inner: Arc::new(RwLock::new(CircuitBreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                probe_in_flight: false,
                total_failures: 0,
                total_successes: 0,
                trips: 0,
            })),
            config,
        }
    }

    /// Whether the provider should be called now.
    ///
    /// While half-open only one caller at a time gets through; it must report
    /// back with `record_success` or `record_failure`.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.write();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.cooldown)
                    .unwrap_or(true);
                if cooled_down {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    inner.probe_in_flight = true;
                    info!("{}: circuit half-open, probing", self.name);
                }
                cooled_down
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        inner.total_successes += 1;
        inner.consecutive_failures = 0;
        inner.probe_in_flight = false;

        if inner.state != CircuitState::Closed {
            inner.consecutive_successes += 1;
            if inner.consecutive_successes >= self.config.success_threshold {
                inner.state = CircuitState::Closed;
                inner.consecutive_successes = 0;
                inner.opened_at = None;
                info!("{}: circuit closed", self.name);
            }
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.write();
        inner.total_failures += 1;
        inner.consecutive_successes = 0;
        inner.probe_in_flight = false;
        inner.consecutive_failures += 1;

        let should_open = match inner.state {
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            // Failed probe
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };

        if should_open {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.trips += 1;
            warn!(
                "{}: circuit open after {} consecutive failure(s), skipping for {:?}",
                self.name, inner.consecutive_failures, self.config.cooldown
            );
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.read();
        CircuitBreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            trips: inner.trips,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: usize,
    pub total_failures: usize,
    pub total_successes: usize,
    pub trips: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: usize, cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::with_config(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                cooldown,
                success_threshold: 1,
            },
        )
    }

    #[test]
    fn test_opens_after_threshold() {
        let breaker = breaker(3, Duration::from_secs(60));

        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
        assert_eq!(breaker.stats().trips, 1);
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let breaker = breaker(2, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_probe_recovers() {
        let breaker = breaker(1, Duration::ZERO);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_probe_failure_reopens() {
        let breaker = breaker(1, Duration::ZERO);
        breaker.record_failure();
        assert!(breaker.allow_request());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.stats().trips, 2);
    }

    #[test]
    fn test_half_open_admits_one_probe_at_a_time() {
        let breaker = CircuitBreaker::with_config(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 1,
                cooldown: Duration::ZERO,
                success_threshold: 2,
            },
        );
        breaker.record_failure();

        assert!(breaker.allow_request());
        assert!(!breaker.allow_request());
        assert!(!breaker.clone().allow_request());

        // Probe reported, still half-open: the next probe may go
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.allow_request());
        assert!(!breaker.allow_request());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request());
        assert!(breaker.allow_request());
    }
}
