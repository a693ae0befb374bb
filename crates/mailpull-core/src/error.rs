//! Error types for the core library.

use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;
use crate::source::FetchError;

/// Errors that can end a sync run or prevent one from starting.
#[derive(Debug, Error)]
pub enum Error {
    /// Settings are missing or invalid.
    #[error("Configuration error: {}", join_config_errors(.0))]
    Config(Vec<ConfigError>),

    /// A bearer credential could not be obtained.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A page or change-feed page could not be fetched.
    #[error("Page fetch error: {0}")]
    PageFetch(#[source] FetchError),

    /// A single message could not be fetched or persisted.
    ///
    /// The coordinator only logs and counts these; they never end a run.
    #[error("Item {id} failed: {reason}")]
    Item {
        /// Remote message id.
        id: String,
        /// Human-readable cause.
        reason: String,
    },

    /// The checkpoint could not be written.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// An argument handed to a constructor or operation was invalid.
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error is an isolated per-item failure.
    #[must_use]
    pub const fn is_item_level(&self) -> bool {
        matches!(self, Self::Item { .. })
    }
}

impl From<FetchError> for Error {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Auth(reason) => Self::Auth(reason),
            other => Self::PageFetch(other),
        }
    }
}

fn join_config_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
