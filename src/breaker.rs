//! Failure-driven admission gating with half-open probing.
//!
//! The breaker moves between three states. CLOSED admits everything and
//! counts consecutive failures; reaching the threshold opens the circuit.
//! OPEN rejects until `reset_timeout` has elapsed since the last failure,
//! then the next request transitions to HALF_OPEN and is admitted as the
//! single probe; concurrent requests keep being rejected until the probe
//! resolves. A successful probe closes the circuit and resets the failure
//! count; a failed probe reopens it. The failure count resets only in
//! CLOSED and on the probe's success; outcomes reported while the circuit
//! is OPEN do not touch it.
//!
//! A failure is an observed response with status >= 500.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls are admitted; failures are counted.
    Closed,
    /// Calls are rejected until the reset timeout elapses.
    Open,
    /// One probe call is in flight to test recovery.
    HalfOpen,
}

struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Three-state circuit breaker.
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a closed breaker tripping after `failure_threshold`
    /// consecutive failures and probing after `reset_timeout`.
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Decides whether an incoming request may proceed.
    ///
    /// In OPEN, an elapsed reset timeout moves the breaker to HALF_OPEN and
    /// admits the caller as the probe; otherwise the call is rejected. In
    /// HALF_OPEN only the probe is in flight, so further calls are rejected.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        match state.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let waited_out = state
                    .last_failure_at
                    .is_none_or(|at| at.elapsed() > self.reset_timeout);
                if waited_out {
                    state.state = CircuitState::HalfOpen;
                    state.probe_in_flight = true;
                    debug!("circuit breaker half-open, admitting probe");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if state.probe_in_flight {
                    false
                } else {
                    state.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Records the outcome of an admitted request.
    pub fn record(&self, success: bool) {
        let mut state = self.state.lock();
        match state.state {
            CircuitState::Closed => {
                if success {
                    state.consecutive_failures = 0;
                } else {
                    state.consecutive_failures += 1;
                    state.last_failure_at = Some(Instant::now());
                    if state.consecutive_failures >= self.failure_threshold {
                        state.state = CircuitState::Open;
                        warn!(
                            failures = state.consecutive_failures,
                            "circuit breaker opened"
                        );
                    }
                }
            }
            CircuitState::HalfOpen => {
                state.probe_in_flight = false;
                if success {
                    state.state = CircuitState::Closed;
                    state.consecutive_failures = 0;
                    debug!("circuit breaker closed after successful probe");
                } else {
                    state.state = CircuitState::Open;
                    state.last_failure_at = Some(Instant::now());
                    warn!("circuit breaker reopened after failed probe");
                }
            }
            // Stragglers admitted before the trip report here; the circuit
            // only leaves OPEN through the reset timeout.
            CircuitState::Open => {}
        }
    }

    /// Current state, for introspection endpoints.
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Consecutive failure count, for introspection endpoints.
    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, timeout_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(threshold, Duration::from_millis(timeout_ms))
    }

    #[test]
    fn trips_after_threshold_consecutive_failures() {
        let cb = breaker(3, 1000);
        for _ in 0..3 {
            assert!(cb.try_acquire());
            cb.record(false);
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.try_acquire());
    }

    #[test]
    fn success_resets_failure_count_in_closed() {
        let cb = breaker(3, 1000);
        cb.record(false);
        cb.record(false);
        cb.record(true);
        cb.record(false);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 1);
    }

    #[test]
    fn half_open_admits_exactly_one_probe() {
        let cb = breaker(1, 20);
        cb.record(false);
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(30));
        assert!(cb.try_acquire());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        // Concurrent requests are rejected while the probe is in flight.
        assert!(!cb.try_acquire());
        assert!(!cb.try_acquire());
    }

    #[test]
    fn probe_success_closes_and_resets() {
        let cb = breaker(1, 20);
        cb.record(false);
        std::thread::sleep(Duration::from_millis(30));
        assert!(cb.try_acquire());
        cb.record(true);

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
        assert!(cb.try_acquire());
    }

    #[test]
    fn probe_failure_reopens() {
        let cb = breaker(1, 20);
        cb.record(false);
        std::thread::sleep(Duration::from_millis(30));
        assert!(cb.try_acquire());
        cb.record(false);

        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.try_acquire());
    }

    #[test]
    fn open_ignores_straggler_outcomes() {
        let cb = breaker(2, 10_000);
        cb.record(false);
        cb.record(false);
        assert_eq!(cb.state(), CircuitState::Open);

        // A request admitted before the trip completes successfully; the
        // circuit stays open and the count is untouched.
        cb.record(true);
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.consecutive_failures(), 2);
    }
}
