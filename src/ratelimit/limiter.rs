//! Core fixed-window rate limiter.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::decision::Decision;
use super::policy::Policy;
use super::record::UsageRecord;
use crate::error::{RatekeeperError, Result};

/// A fixed-window rate limiter keyed by caller-chosen identifiers.
///
/// Each limiter owns its own store; share one instance through an `Arc`.
/// Checks for the same key are serialized by the shard lock that guards the
/// key, while keys in other shards proceed in parallel.
pub struct Limiter {
    /// Usage records indexed by key
    records: DashMap<String, UsageRecord>,
}

impl Limiter {
    /// Create an empty limiter.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Check and count one attempt for `key` against `policy` using the
    /// current wall clock.
    pub fn check(&self, key: &str, policy: &Policy) -> Result<Decision> {
        self.check_at(key, policy, Utc::now())
    }

    /// Check and count one attempt for `key` against `policy` at `now`.
    ///
    /// A missing record and an expired record are handled identically: both
    /// open a fresh window with the attempt counted. An expired window always
    /// grants a fresh quota, whatever state the previous window ended in.
    pub fn check_at(&self, key: &str, policy: &Policy, now: DateTime<Utc>) -> Result<Decision> {
        if key.is_empty() {
            return Err(RatekeeperError::InvalidKey(
                "key must not be empty".to_string(),
            ));
        }
        policy.validate()?;
        let fresh_reset_at = policy.window_end(now)?;
        let max_requests = policy.max_requests;

        trace!(key = %key, max_requests, "Checking rate limit");

        // The entry guard holds the shard write lock until the decision is made
        let decision = match self.records.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if record.is_expired(now) {
                    *record = UsageRecord::start(fresh_reset_at);
                    debug!(key = %key, reset_at = %fresh_reset_at, "Opened new rate limit window");
                    Decision {
                        allowed: true,
                        remaining: record.remaining(max_requests),
                        reset_at: fresh_reset_at,
                    }
                } else if record.try_increment(max_requests) {
                    Decision {
                        allowed: true,
                        remaining: record.remaining(max_requests),
                        reset_at: record.reset_at(),
                    }
                } else {
                    debug!(key = %key, reset_at = %record.reset_at(), "Rate limit exceeded");
                    Decision {
                        allowed: false,
                        remaining: 0,
                        reset_at: record.reset_at(),
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let record = vacant.insert(UsageRecord::start(fresh_reset_at));
                debug!(key = %key, reset_at = %fresh_reset_at, "Opened new rate limit window");
                Decision {
                    allowed: true,
                    remaining: record.remaining(max_requests),
                    reset_at: fresh_reset_at,
                }
            }
        };

        Ok(decision)
    }

    /// Remove every record whose window has ended at `now`.
    ///
    /// Expiry is re-evaluated under each shard's write lock, so a record that
    /// a concurrent `check` has just moved into a new window survives.
    /// Returns the number of records removed.
    pub fn reclaim(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = !record.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Get a snapshot of the record for `key`.
    ///
    /// Returns `None` if no record exists for the key.
    pub fn record(&self, key: &str) -> Option<UsageRecord> {
        self.records.get(key).map(|r| *r)
    }

    /// Clear all records.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.records.clear();
    }

    /// Get the number of tracked keys.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for Limiter {
    fn default() -> Self {
        Self::new()
    }
}
