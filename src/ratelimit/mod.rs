//! Rate limiting logic and state management.

mod decision;
mod limiter;
mod policy;
mod reclaimer;
mod record;

pub use decision::{Decision, RateLimitHeaders, HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET};
pub use limiter::Limiter;
pub use policy::{Policy, PolicyFile, PolicyRule, PolicyTable, Preset};
pub use reclaimer::{Reclaimer, ReclaimerHandle, DEFAULT_RECLAIM_INTERVAL};
pub use record::UsageRecord;
