//! Injected clock: tests control time directly instead of monkey-patching
//! adapters.

use std::time::Instant;

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn system_now(&self) -> chrono::DateTime<chrono::Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_now(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }
}

/// Monotonic stopwatch used for per-phase durations: measured
/// monotonically, never from wall-clock timestamps.
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    pub fn start(clock: &dyn Clock) -> Self {
        Stopwatch { start: clock.now() }
    }

    pub fn elapsed_ms(&self, clock: &dyn Clock) -> u64 {
        clock.now().duration_since(self.start).as_millis() as u64
    }
}
