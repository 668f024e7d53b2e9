//! Error types for Tollgate.

use std::time::Duration;

use thiserror::Error;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A route override pattern failed to compile
    #[error("Invalid override pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// An identity lookup strategy name was not recognised
    #[error("Unknown identity lookup: {0}")]
    UnknownLookup(String),

    /// The backing counter failed
    #[error("Counter backend error: {0}")]
    Backend(String),

    /// The backing counter did not answer in time
    #[error("Counter backend timed out after {timeout:?} for key {key}")]
    BackendTimeout { key: String, timeout: Duration },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TollgateError {
    /// Whether this error came from the counter backend rather than from
    /// configuration.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            TollgateError::Backend(_) | TollgateError::BackendTimeout { .. }
        )
    }
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
