//! Time sources.
//!
//! Everything in the engine that compares timestamps asks a [`ClockSource`]
//! instead of calling `Instant::now()` directly, so tests can drive time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Supplies monotonic timestamps.
pub trait ClockSource: Send + Sync + 'static {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// The production clock.
///
/// Reads Tokio's clock rather than `std`'s, so a runtime started with
/// `start_paused = true` moves this clock too when it auto-advances.
/// Outside a paused runtime this is plain wall-clock monotonic time.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl ClockSource for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// A clock that only moves when told to.
///
/// Stores an origin and an offset in nanoseconds; `advance` bumps the
/// offset atomically, so it can be shared across tasks without a lock.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset_nanos: AtomicU64,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}
