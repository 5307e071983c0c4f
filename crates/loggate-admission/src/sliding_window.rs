//! Sliding window rate limiter.
//!
//! A fixed-capacity ring buffer of accept timestamps. Acceptance of a new
//! message requires the slot about to be overwritten to be at least one
//! window old, so at most `capacity` messages are accepted in any trailing
//! 60-second interval. This is a closed sliding window, not a leaky bucket:
//! the `capacity`-th message within 60 seconds of the oldest recorded accept
//! is rejected.

use std::num::NonZeroU32;

/// Window length in seconds.
pub const WINDOW_SECS: u32 = 60;

/// Sentinel for a slot that has never held an accept. `u32` unix timestamps
/// stay strictly below this value until the year 2106; elapsed time against
/// the sentinel is computed with wrapping arithmetic so it always reads as
/// "older than the window".
pub const NEVER: u32 = u32::MAX;

/// Result of one [`SlidingWindow::check`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowDecision {
    /// True when the quota for the trailing window is already spent.
    pub exceeded: bool,
    /// Consecutive rejections since the last reset.
    pub offenses: u32,
}

/// Per-identity rolling quota enforcement.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    /// Accept timestamps, unix seconds. Length is the per-minute capacity.
    slots: Vec<u32>,
    /// Next slot to check/overwrite; wraps modulo capacity.
    cursor: usize,
    /// Consecutive rejections since the last reset or ban.
    offenses: u32,
}

impl SlidingWindow {
    /// Create a limiter allowing `capacity` accepts per rolling window.
    /// A zero capacity is unrepresentable.
    #[must_use]
    pub fn new(capacity: NonZeroU32) -> Self {
        Self {
            slots: vec![NEVER; capacity.get() as usize],
            cursor: 0,
            offenses: 0,
        }
    }

    /// Record an arrival at `now_secs` and report whether it exceeds the
    /// quota.
    ///
    /// A rejected arrival is not counted as accepted traffic: the cursor does
    /// not advance and no slot is overwritten, it only bumps the offense
    /// count. An accepted arrival leaves the offense count untouched; only
    /// [`Self::reset`] (or a ban, which resets) clears offenses.
    pub fn check(&mut self, now_secs: u32) -> WindowDecision {
        // Wrapping keeps the NEVER sentinel reading as infinitely old.
        let elapsed = now_secs.wrapping_sub(self.slots[self.cursor]);
        if elapsed < WINDOW_SECS {
            self.offenses += 1;
            return WindowDecision {
                exceeded: true,
                offenses: self.offenses,
            };
        }

        self.slots[self.cursor] = now_secs;
        self.cursor = (self.cursor + 1) % self.slots.len();
        WindowDecision {
            exceeded: false,
            offenses: self.offenses,
        }
    }

    /// Clear offenses and forget all recorded accepts.
    pub fn reset(&mut self) {
        self.offenses = 0;
        self.slots.fill(NEVER);
    }

    /// Consecutive rejections since the last reset.
    #[must_use]
    pub const fn offenses(&self) -> u32 {
        self.offenses
    }

    /// Accepts allowed per rolling window.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
