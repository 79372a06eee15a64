//! Wall-clock source
//!
//! Consensus compares block timestamps against a corrected wall clock.
//! The clock sits behind a trait so validation and forging stay
//! deterministic under test, and so an NTP-corrected source can slot in
//! without touching the controller. Readings are monotonic within a
//! run but may jump backwards on resync; consumers clamp elapsed time
//! instead of assuming order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of corrected wall-clock time
pub trait TimeSource: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_millis(&self) -> u64;
}

/// The system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A manually advanced clock for tests
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now_ms: AtomicU64,
}

impl ManualTimeSource {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_millis(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
