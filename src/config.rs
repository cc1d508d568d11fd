//! Configuration management for Ratekeeper.
//!
//! Settings are layered: built-in defaults, then an optional file, then
//! `RATEKEEPER__*` environment variables (`__` separates sections, e.g.
//! `RATEKEEPER__SERVER__LISTEN_ADDR`).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RatekeeperError, Result};
use crate::ratelimit::PolicyTable;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "RATEKEEPER";

/// Main configuration for the Ratekeeper service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Seconds between reclamation sweeps
    #[serde(default = "default_reclaim_interval")]
    pub reclaim_interval_secs: u64,

    /// Path to a YAML policy table overriding or extending the presets
    #[serde(default)]
    pub policies_path: Option<PathBuf>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            reclaim_interval_secs: default_reclaim_interval(),
            policies_path: None,
        }
    }
}

fn default_reclaim_interval() -> u64 {
    300
}

impl LimiterConfig {
    /// Period between reclamation sweeps.
    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }

    /// Build the policy table: presets, plus the policy file when one is set.
    pub fn policy_table(&self) -> Result<PolicyTable> {
        match &self.policies_path {
            Some(path) => PolicyTable::from_file(path),
            None => Ok(PolicyTable::new()),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl RatekeeperConfig {
    /// Load configuration from an optional file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: RatekeeperConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.limiter.reclaim_interval_secs == 0 {
            return Err(RatekeeperError::Config(
                "limiter.reclaim_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
