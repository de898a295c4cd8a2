//! Shared circuit-breaker state machine: one instance per external
//! service, mutex-guarded, CLOSED -> OPEN -> HALF_OPEN -> CLOSED.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    /// Gauge value for the `circuit_breaker_state{service}` metric (0/1/2
    /// for CLOSED/HALF_OPEN/OPEN).
    pub fn gauge_value(self) -> i64 {
        match self {
            BreakerState::Closed => 0,
            BreakerState::HalfOpen => 1,
            BreakerState::Open => 2,
        }
    }
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_probe_in_flight: bool,
}

/// Fails fast while OPEN; admits exactly one probe when HALF_OPEN.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    open_duration: Duration,
    inner: Mutex<Inner>,
}

pub enum Admission {
    Admitted,
    Probe,
    FailFast,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, open_duration: Duration) -> Self {
        CircuitBreaker {
            name: name.into(),
            failure_threshold,
            open_duration,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_probe_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    /// Call before attempting the external call. With an injected `now`
    /// so tests can drive the OPEN->HALF_OPEN transition deterministically.
    pub fn admit(&self, now: Instant) -> Admission {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => Admission::Admitted,
            BreakerState::HalfOpen => {
                if inner.half_open_probe_in_flight {
                    Admission::FailFast
                } else {
                    inner.half_open_probe_in_flight = true;
                    Admission::Probe
                }
            }
            BreakerState::Open => {
                let opened_at = inner.opened_at.unwrap_or(now);
                if now.duration_since(opened_at) >= self.open_duration {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_probe_in_flight = true;
                    tracing::info!(service = %self.name, "circuit breaker half-open, admitting probe");
                    Admission::Probe
                } else {
                    Admission::FailFast
                }
            }
        }
    }

    pub fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        let was = inner.state;
        inner.consecutive_failures = 0;
        inner.half_open_probe_in_flight = false;
        inner.state = BreakerState::Closed;
        inner.opened_at = None;
        if was != BreakerState::Closed {
            tracing::info!(service = %self.name, "circuit breaker closed after success");
        }
    }

    pub fn on_failure(&self, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        inner.half_open_probe_in_flight = false;
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(now);
                tracing::info!(service = %self.name, "circuit breaker re-opened after failed probe");
            }
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(now);
                    tracing::info!(
                        service = %self.name,
                        failures = inner.consecutive_failures,
                        "circuit breaker opened"
                    );
                }
            }
            BreakerState::Open => {
                inner.opened_at = Some(now);
            }
        }
    }

    /// Seconds the breaker has been continuously OPEN, for the
    /// "OPEN for > 60s" alert rule.
    pub fn open_duration_secs(&self, now: Instant) -> Option<u64> {
        let inner = self.inner.lock().unwrap();
        match (inner.state, inner.opened_at) {
            (BreakerState::Open, Some(opened_at)) => {
                Some(now.duration_since(opened_at).as_secs())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let cb = CircuitBreaker::new("llm", 5, Duration::from_secs(30));
        let t0 = Instant::now();
        for _ in 0..4 {
            assert!(matches!(cb.admit(t0), Admission::Admitted));
            cb.on_failure(t0);
        }
        assert_eq!(cb.state(), BreakerState::Closed);
        cb.on_failure(t0);
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(matches!(cb.admit(t0), Admission::FailFast));
    }

    #[test]
    fn half_open_probe_success_closes() {
        let cb = CircuitBreaker::new("llm", 1, Duration::from_secs(30));
        let t0 = Instant::now();
        cb.on_failure(t0);
        assert_eq!(cb.state(), BreakerState::Open);

        let t1 = t0 + Duration::from_secs(31);
        assert!(matches!(cb.admit(t1), Admission::Probe));
        cb.on_success();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_probe_failure_reopens_and_resets_timer() {
        let cb = CircuitBreaker::new("ds", 1, Duration::from_secs(30));
        let t0 = Instant::now();
        cb.on_failure(t0);
        let t1 = t0 + Duration::from_secs(31);
        assert!(matches!(cb.admit(t1), Admission::Probe));
        cb.on_failure(t1);
        assert_eq!(cb.state(), BreakerState::Open);
        // Timer reset: 1s after t1 is still well within the new window.
        assert!(matches!(cb.admit(t1 + Duration::from_secs(1)), Admission::FailFast));
    }
}
