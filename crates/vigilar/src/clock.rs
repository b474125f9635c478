//! Time sources for the lifecycle engine.
//!
//! All timing state (assertion `start_time`, timeout deadlines, settlement
//! timestamps) flows through a [`TimeSource`] so tests can drive the clock
//! deterministically instead of sleeping against wall time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of "current time" in milliseconds since the Unix epoch.
pub trait TimeSource: Send + Sync {
    /// Current time in milliseconds since the Unix epoch
    fn now_ms(&self) -> u64;
}

/// Wall-clock time source backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Fake clock for deterministic tests.
///
/// Time only moves when [`FakeClock::advance`] or [`FakeClock::set`] is
/// called, so timeout scenarios are exact rather than sleep-based.
#[derive(Debug)]
pub struct FakeClock {
    current_ms: AtomicU64,
}

impl FakeClock {
    /// Create a fake clock starting at the given epoch milliseconds
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self {
            current_ms: AtomicU64::new(start_ms),
        }
    }

    /// Advance the clock by the given number of milliseconds
    pub fn advance(&self, ms: u64) {
        self.current_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump the clock to an absolute time
    pub fn set(&self, ms: u64) {
        self.current_ms.store(ms, Ordering::SeqCst);
    }
}

impl TimeSource for FakeClock {
    fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_starts_at_given_time() {
        let clock = FakeClock::new(1_230_000_000_000);
        assert_eq!(clock.now_ms(), 1_230_000_000_000);
    }

    #[test]
    fn fake_clock_advances() {
        let clock = FakeClock::new(1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 2_000);
    }

    #[test]
    fn fake_clock_set_jumps() {
        let clock = FakeClock::new(0);
        clock.set(42);
        assert_eq!(clock.now_ms(), 42);
    }

    #[test]
    fn system_clock_is_nonzero() {
        assert!(SystemClock.now_ms() > 0);
    }
}
