//! Error types for Parlay

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Parlay operations
pub type Result<T> = std::result::Result<T, ParlayError>;

/// Main error type for Parlay
#[derive(Error, Debug)]
pub enum ParlayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The state index could not be opened or queried.
    ///
    /// Never folded into "no record": callers must not mistake a broken store
    /// for an empty one.
    #[error("State index unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("Fetch failed for {url} after {attempts} attempt(s): {message}")]
    TransientFetch {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("Write failed for {}: {message}", path.display())]
    WriteFailure { path: PathBuf, message: String },

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ParlayError {
    /// Create a persistence error
    pub fn persistence(msg: impl std::fmt::Display) -> Self {
        Self::PersistenceUnavailable(msg.to_string())
    }

    /// Create a write failure for `path`
    pub fn write_failure(path: impl Into<PathBuf>, msg: impl std::fmt::Display) -> Self {
        Self::WriteFailure {
            path: path.into(),
            message: msg.to_string(),
        }
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Errors that must abort the current refresh pass instead of being
    /// logged and skipped.
    pub fn is_fatal_to_pass(&self) -> bool {
        matches!(self, Self::PersistenceUnavailable(_))
    }
}
