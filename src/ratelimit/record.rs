//! Per-key usage record.

use chrono::{DateTime, Utc};

/// Attempts counted for one key in its current fixed window.
///
/// A record only exists once a key has been seen, so `count` is always at
/// least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageRecord {
    /// Attempts counted in the current window
    count: u32,
    /// When the current window ends
    reset_at: DateTime<Utc>,
}

impl UsageRecord {
    /// Open a window ending at `reset_at` with the first attempt counted.
    pub fn start(reset_at: DateTime<Utc>) -> Self {
        Self { count: 1, reset_at }
    }

    /// Get the current count.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Get the end of the current window.
    pub fn reset_at(&self) -> DateTime<Utc> {
        self.reset_at
    }

    /// Whether the window has ended at `now`. A window ending exactly at
    /// `now` counts as ended.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.reset_at <= now
    }

    /// Count one more attempt if the ceiling allows it.
    ///
    /// Returns `true` if the attempt was counted, `false` if `max_requests`
    /// was already reached.
    pub fn try_increment(&mut self, max_requests: u32) -> bool {
        if self.count >= max_requests {
            return false;
        }
        self.count += 1;
        true
    }

    /// Get the remaining quota under `max_requests`.
    pub fn remaining(&self, max_requests: u32) -> u32 {
        max_requests.saturating_sub(self.count)
    }
}
