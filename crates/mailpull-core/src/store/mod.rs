//! Mail persistence.
//!
//! A [`MailStore`] turns one message (metadata plus raw byte stream) into a
//! directory on disk. [`FileSystemStore`] is the only implementation; the
//! trait exists so the sync coordinator can be tested without touching the
//! filesystem.

mod attachments;
mod filesystem;
mod model;

pub use filesystem::{FileSystemStore, RAW_MESSAGE_FILE_NAME, StoreSettings};
pub use model::{EmailMetadata, SaveResult};

use async_trait::async_trait;

use crate::source::RawMessage;

/// Errors from a [`MailStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Invalid store settings or message metadata.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The raw message could not be parsed for attachment extraction.
    #[error("message parse error: {0}")]
    Parse(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persists messages.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Write one message and return where it ended up.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing usable could be written. A failed save
    /// leaves no partially written message folder behind.
    async fn save_email(&self, metadata: &EmailMetadata, raw: RawMessage)
    -> StoreResult<SaveResult>;
}
