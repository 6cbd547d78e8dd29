use std::time::Instant;

/// Monotonic millisecond clock for the cooperative control loop.
///
/// The core never sleeps; it re-checks "not yet due" deadlines against this
/// clock every iteration. Timestamps are `u32` milliseconds and are compared
/// with wrapping arithmetic, so a rollover (~49.7 days) is harmless.
pub trait Clock {
    /// Milliseconds since an arbitrary epoch, wrapping at `u32::MAX`.
    fn now_ms(&self) -> u32;
}

/// Default, real-time monotonic clock backed by `std::time::Instant`.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ms(&self) -> u32 {
        let ms = self.epoch.elapsed().as_millis();
        (ms % (u128::from(u32::MAX) + 1)) as u32
    }
}

/// Deterministic clock whose time is advanced manually.
///
/// Used by tests and the simulation rig; `now_ms` never moves on its own.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: std::cell::Cell<u32>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(ms: u32) -> Self {
        Self {
            now: std::cell::Cell::new(ms),
        }
    }

    /// Advance the clock by `ms`, wrapping at `u32::MAX`.
    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_ms(&self) -> u32 {
        self.now.get()
    }
}
