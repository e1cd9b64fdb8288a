//! Cancellable timers owned by the aggregate they drive.
//!
//! A [`Timer`] is plain data: a deadline plus the delay it was armed with.
//! The owning Keep checks its timers in [`crate::keep::Keep::advance`] while
//! holding its own lock, so disarming a timer is always observed before the
//! next firing decision.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Monotonic millisecond clock.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock measured from process start.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
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
    fn now_ms(&self) -> u64 {
        // Start at 1 so that 0 can mean "never" in timestamps.
        self.origin.elapsed().as_millis() as u64 + 1
    }
}

/// Hand-driven clock for tests and replays.
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<u64>,
    delay: Option<u64>,
    /// Re-arm interval for repeating timers.
    interval: Option<u64>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot timer `delay` ms from `now`, replacing any pending deadline.
    pub fn arm(&mut self, now: u64, delay: u64) {
        self.deadline = Some(now + delay);
        self.delay = Some(delay);
        self.interval = None;
    }

    /// Arm a repeating timer: first fire after `first`, then every `interval`.
    pub fn arm_repeating(&mut self, now: u64, first: u64, interval: u64) {
        self.deadline = Some(now + first);
        self.delay = Some(first);
        self.interval = Some(interval);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
        self.delay = None;
        self.interval = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    /// Delay the timer was last armed with.
    pub fn delay(&self) -> Option<u64> {
        self.delay
    }

    pub fn interval(&self) -> Option<u64> {
        self.interval
    }

    pub fn remaining(&self, now: u64) -> Option<u64> {
        self.deadline.map(|d| d.saturating_sub(now))
    }

    pub fn is_due(&self, now: u64) -> bool {
        matches!(self.deadline, Some(d) if d <= now)
    }

    /// Consume a due firing. Repeating timers re-arm from their deadline;
    /// one-shot timers disarm and the callback may re-arm them.
    pub fn take_due(&mut self, now: u64) -> bool {
        let Some(deadline) = self.deadline else {
            return false;
        };
        if deadline > now {
            return false;
        }
        match self.interval {
            Some(interval) => {
                // Catch up without replaying every missed period.
                let mut next = deadline + interval.max(1);
                if next <= now {
                    next = now + interval.max(1);
                }
                self.deadline = Some(next);
                self.delay = Some(interval);
            }
            None => {
                self.deadline = None;
                self.delay = None;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Id allocation
// ---------------------------------------------------------------------------

/// Allocator for simulated entity ids spawned by keeps.
pub struct IdAllocator {
    next: Mutex<u64>,
}

impl IdAllocator {
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: Mutex::new(first),
        }
    }

    pub fn next(&self) -> u64 {
        let mut next = self.next.lock();
        let id = *next;
        *next += 1;
        id
    }
}
