//! Rate limit policies, named presets and the policy table.
//!
//! A [`Policy`] is a `(window, max_requests)` pair describing one traffic
//! class. Five presets ship with the crate; operators can override them or
//! register additional named policies through a YAML document.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::{RatekeeperError, Result};

/// An immutable rate limit: at most `max_requests` attempts per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Length of one fixed window
    pub window: Duration,
    /// Ceiling within one window
    pub max_requests: u32,
}

impl Policy {
    /// Create a policy, rejecting values that cannot be enforced.
    pub fn new(window: Duration, max_requests: u32) -> Result<Self> {
        let policy = Self {
            window,
            max_requests,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Check that the window and ceiling are both positive and that the
    /// window fits in a signed timestamp offset.
    pub fn validate(&self) -> Result<()> {
        if self.window.is_zero() {
            return Err(RatekeeperError::InvalidPolicy(
                "window must be greater than zero".to_string(),
            ));
        }
        if self.max_requests == 0 {
            return Err(RatekeeperError::InvalidPolicy(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        self.window_delta().map(|_| ())
    }

    /// End of a window that starts at `now`.
    pub fn window_end(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        now.checked_add_signed(self.window_delta()?).ok_or_else(|| {
            RatekeeperError::InvalidPolicy(format!(
                "window of {:?} overflows the timestamp range",
                self.window
            ))
        })
    }

    fn window_delta(&self) -> Result<TimeDelta> {
        TimeDelta::from_std(self.window).map_err(|_| {
            RatekeeperError::InvalidPolicy(format!("window of {:?} is too large", self.window))
        })
    }
}

/// Named policy presets for the built-in traffic classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// Expensive generation calls: 10 per minute
    ExpensiveGeneration,
    /// General API calls: 60 per minute
    GeneralApi,
    /// Read-heavy calls: 120 per minute
    ReadHeavy,
    /// Authentication attempts: 5 per 15 minutes
    Authentication,
    /// Payment attempts: 3 per hour
    Payment,
}

impl Preset {
    /// Every preset, in declaration order.
    pub const ALL: [Preset; 5] = [
        Preset::ExpensiveGeneration,
        Preset::GeneralApi,
        Preset::ReadHeavy,
        Preset::Authentication,
        Preset::Payment,
    ];

    /// The policy this preset stands for.
    pub fn policy(&self) -> Policy {
        let (window_secs, max_requests) = match self {
            Preset::ExpensiveGeneration => (60, 10),
            Preset::GeneralApi => (60, 60),
            Preset::ReadHeavy => (60, 120),
            Preset::Authentication => (15 * 60, 5),
            Preset::Payment => (60 * 60, 3),
        };
        Policy {
            window: Duration::from_secs(window_secs),
            max_requests,
        }
    }

    /// The name used in configuration and on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Preset::ExpensiveGeneration => "expensive-generation",
            Preset::GeneralApi => "general-api",
            Preset::ReadHeavy => "read-heavy",
            Preset::Authentication => "authentication",
            Preset::Payment => "payment",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = RatekeeperError;

    fn from_str(s: &str) -> Result<Self> {
        Preset::ALL
            .into_iter()
            .find(|preset| preset.name() == s)
            .ok_or_else(|| RatekeeperError::UnknownPolicy(s.to_string()))
    }
}

/// A policy as written in a policy file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Ceiling within one window
    pub max_requests: u32,
}

impl TryFrom<&PolicyRule> for Policy {
    type Error = RatekeeperError;

    fn try_from(rule: &PolicyRule) -> Result<Self> {
        Policy::new(Duration::from_millis(rule.window_ms), rule.max_requests)
    }
}

/// On-disk format of a policy file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyFile {
    /// Map of policy name to rule
    #[serde(default)]
    pub policies: HashMap<String, PolicyRule>,
}

/// Lookup from policy name to [`Policy`], seeded with every [`Preset`].
#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: HashMap<String, Policy>,
}

impl PolicyTable {
    /// Create a table holding only the presets.
    pub fn new() -> Self {
        let policies = Preset::ALL
            .into_iter()
            .map(|preset| (preset.name().to_string(), preset.policy()))
            .collect();
        Self { policies }
    }

    /// Load preset overrides and extra policies from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading policy table");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load preset overrides and extra policies from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: PolicyFile = serde_yaml::from_str(yaml)
            .map_err(|e| RatekeeperError::Config(format!("Failed to parse policy file: {}", e)))?;

        let mut table = Self::new();
        for (name, rule) in &file.policies {
            let policy = Policy::try_from(rule).map_err(|e| {
                RatekeeperError::Config(format!("Policy '{}' is invalid: {}", name, e))
            })?;
            table.insert(name.clone(), policy);
        }
        Ok(table)
    }

    /// Register or replace a named policy.
    pub fn insert(&mut self, name: impl Into<String>, policy: Policy) {
        self.policies.insert(name.into(), policy);
    }

    /// Look up a policy by name.
    pub fn get(&self, name: &str) -> Option<&Policy> {
        self.policies.get(name)
    }

    /// Look up a policy by name, failing with [`RatekeeperError::UnknownPolicy`].
    pub fn resolve(&self, name: &str) -> Result<Policy> {
        self.get(name)
            .copied()
            .ok_or_else(|| RatekeeperError::UnknownPolicy(name.to_string()))
    }

    /// Number of registered policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new()
    }
}
