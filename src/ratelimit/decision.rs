//! Admission decisions and their projection onto response metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Header carrying the configured ceiling.
pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
/// Header carrying the remaining quota.
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
/// Header carrying the window end as epoch milliseconds.
pub const HEADER_RESET: &str = "X-RateLimit-Reset";

/// The outcome of one admission check.
///
/// `allowed == false` is a normal outcome, not an error. `reset_at` is the end
/// of the window that was active (or opened) when the check ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl Decision {
    /// Project this decision onto rate limit response metadata.
    pub fn headers(&self, max_requests: u32) -> RateLimitHeaders {
        RateLimitHeaders {
            limit: max_requests,
            remaining: self.remaining,
            reset: self.reset_at.timestamp_millis(),
        }
    }

    /// How long a denied caller should wait, rounded up to whole seconds.
    ///
    /// Zero once `reset_at` has passed.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        let millis = (self.reset_at - now).num_milliseconds();
        if millis <= 0 {
            return Duration::ZERO;
        }
        let secs = (millis as u64).div_ceil(1000);
        Duration::from_secs(secs)
    }
}

/// Rate limit metadata attached to every response, allowed or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitHeaders {
    /// Configured ceiling for the policy
    pub limit: u32,
    /// Remaining quota in the current window
    pub remaining: u32,
    /// Window end, epoch milliseconds
    pub reset: i64,
}

impl RateLimitHeaders {
    /// Name/value pairs in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, String)> {
        [
            (HEADER_LIMIT, self.limit.to_string()),
            (HEADER_REMAINING, self.remaining.to_string()),
            (HEADER_RESET, self.reset.to_string()),
        ]
        .into_iter()
    }
}
