//! Monotonic nanosecond clock.
//!
//! Every component that needs time takes a clock handle instead of reading
//! a global source, so tests can drive the engine deterministically.

use std::{
    sync::atomic::{AtomicI64, Ordering},
    time::Instant,
};

/// Strictly non-decreasing nanosecond time source.
pub trait Clock: Send + Sync {
    fn nano_time(&self) -> i64;
}

/// Host monotonic clock, anchored at construction.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn nano_time(&self) -> i64 {
        // Wraps after ~292 years of uptime, which is outside our care.
        i64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(i64::MAX)
    }
}

/// Test clock whose time only moves when told to.
///
/// Attempts to move backwards are ignored so the monotonicity contract
/// holds no matter what a test does.
#[derive(Debug, Default)]
pub struct MockClock {
    now: AtomicI64,
}

impl MockClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn starting_at(nanos: i64) -> Self {
        Self {
            now: AtomicI64::new(nanos),
        }
    }

    /// Moves the clock forward to `nanos`; a target in the past is a no-op.
    pub fn set(&self, nanos: i64) {
        self.now.fetch_max(nanos, Ordering::Relaxed);
    }

    pub fn advance(&self, nanos: i64) {
        assert!(nanos >= 0, "mock clock cannot move backwards");
        self.now.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn advance_millis(&self, millis: i64) {
        self.advance(millis * 1_000_000);
    }
}

impl Clock for MockClock {
    fn nano_time(&self) -> i64 {
        self.now.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use more_asserts::{assert_ge, assert_le};

    use super::*;

    #[test]
    fn system_clock_is_non_decreasing() {
        let clock = SystemClock::new();
        let mut previous = clock.nano_time();
        for _ in 0..1000 {
            let now = clock.nano_time();
            assert_ge!(now, previous);
            previous = now;
        }
    }

    #[test]
    fn mock_clock_moves_only_forward() {
        let clock = MockClock::new();
        assert_eq!(clock.nano_time(), 0);

        clock.advance_millis(50);
        assert_eq!(clock.nano_time(), 50_000_000);

        clock.set(20_000_000);
        assert_eq!(clock.nano_time(), 50_000_000);

        clock.set(75_000_000);
        assert_eq!(clock.nano_time(), 75_000_000);
    }

    #[test]
    fn mock_clock_starting_point() {
        let clock = MockClock::starting_at(1_000);
        assert_le!(1_000, clock.nano_time());
    }
}
