//! Remote page source interface.
//!
//! The coordinator never speaks HTTP. It drives a [`PageSource`] that lists
//! mail items page by page, walks a change feed, and streams raw messages.

mod credential;
mod model;

pub use credential::{AuthError, CredentialProvider, StaticCredential};
pub use model::{MailItemSummary, Page, PageRequest};

use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Raw message bytes as a stream.
pub type RawMessage = Box<dyn AsyncRead + Send + Unpin>;

/// Errors returned by a [`PageSource`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The stored change-feed token is no longer accepted by the remote.
    #[error("continuation token expired")]
    ContinuationExpired,

    /// The request was not authorized or no credential could be obtained.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The remote answered with an error status.
    #[error("remote returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },

    /// The request was refused locally by a security policy.
    #[error("request refused: {0}")]
    Forbidden(String),

    /// Network or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// A paginated mail listing and message download service.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch one page of a full enumeration.
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError>;

    /// Fetch one page of the change feed at `token`.
    async fn fetch_change_feed(&self, token: &str) -> Result<Page, FetchError>;

    /// Stream the raw RFC 5322 message with the given remote id.
    async fn fetch_raw_message(&self, id: &str) -> Result<RawMessage, FetchError>;
}
