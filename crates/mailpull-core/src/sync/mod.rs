//! Incremental synchronization.
//!
//! [`SyncCoordinator`] drives a [`PageSource`](crate::source::PageSource)
//! through either a full date-filtered enumeration or the change feed,
//! hands every not-yet-processed message to a
//! [`MailStore`](crate::store::MailStore) and records it in the checkpoint.

mod coordinator;
mod stats;

pub use coordinator::SyncCoordinator;
pub use stats::{SyncMode, SyncReport, SyncStats};

use chrono::{DateTime, Utc};

/// Coordinator settings, usually derived from
/// [`AppConfig::sync_settings`](crate::config::AppConfig::sync_settings).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Mailbox address, for log context.
    pub mailbox: String,
    /// Remote folder to enumerate.
    pub folder: String,
    /// Only enumerate messages received at or after this time.
    pub start_date: Option<DateTime<Utc>>,
    /// Items per page in full enumeration.
    pub page_size: u32,
    /// Follow the change feed when the checkpoint holds a token.
    pub use_delta: bool,
    /// Prune dedup entries older than this many days after each run.
    pub retention_days: Option<u32>,
}
