//! Error types for the Ratekeeper service.

use thiserror::Error;

/// Main error type for Ratekeeper operations.
///
/// A denied request is not an error; it is reported through
/// [`Decision::allowed`](crate::ratelimit::Decision::allowed).
#[derive(Error, Debug)]
pub enum RatekeeperError {
    /// The request body could not be decoded
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The caller supplied an unusable key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The caller supplied a policy that cannot be enforced
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// No policy is registered under the requested name
    #[error("Unknown policy: {0}")]
    UnknownPolicy(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Layered settings could not be built or deserialized
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Ratekeeper operations.
pub type Result<T> = std::result::Result<T, RatekeeperError>;
