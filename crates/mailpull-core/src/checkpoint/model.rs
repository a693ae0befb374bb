//! Checkpoint data model.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Durable sync progress for one mailbox folder.
///
/// The dedup ledger (`processed`) maps remote message ids to their received
/// time. Entries only leave the ledger through [`Checkpoint::prune`], and
/// `total_processed_count` only grows, by one per newly recorded id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Checkpoint {
    continuation_token: Option<String>,
    last_sync_timestamp: Option<DateTime<Utc>>,
    last_processed_id: Option<String>,
    total_processed_count: u64,
    processed: HashMap<String, DateTime<Utc>>,
}

impl Checkpoint {
    /// Create an empty checkpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message as processed.
    ///
    /// Returns `true` if the id was not yet in the ledger. Re-marking an id
    /// refreshes its timestamp and `last_processed_id` but does not count
    /// twice.
    pub fn mark_processed(&mut self, id: impl Into<String>, received_at: DateTime<Utc>) -> bool {
        let id = id.into();
        let is_new = self.processed.insert(id.clone(), received_at).is_none();
        self.last_processed_id = Some(id);
        if is_new {
            self.total_processed_count += 1;
        }
        is_new
    }

    /// Whether the message id is in the dedup ledger.
    #[must_use]
    pub fn is_processed(&self, id: &str) -> bool {
        self.processed.contains_key(id)
    }

    /// Store a change-feed continuation token and stamp the sync time.
    pub fn update_continuation(&mut self, token: impl Into<String>) {
        self.continuation_token = Some(token.into());
        self.last_sync_timestamp = Some(Utc::now());
    }

    /// Forget the change-feed continuation token.
    pub fn clear_continuation(&mut self) {
        self.continuation_token = None;
    }

    /// Remove ledger entries received more than `max_age_days` ago.
    ///
    /// Returns the number of removed entries.
    pub fn prune(&mut self, max_age_days: u32) -> usize {
        self.prune_before(Utc::now() - Duration::days(i64::from(max_age_days)))
    }

    /// Remove ledger entries strictly older than `cutoff`.
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.processed.len();
        self.processed.retain(|_, received_at| *received_at >= cutoff);
        before - self.processed.len()
    }

    /// Change-feed continuation token, if any.
    #[must_use]
    pub fn continuation_token(&self) -> Option<&str> {
        self.continuation_token.as_deref()
    }

    /// When the continuation token was last refreshed.
    #[must_use]
    pub const fn last_sync_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_sync_timestamp
    }

    /// Last id passed to [`Checkpoint::mark_processed`].
    #[must_use]
    pub fn last_processed_id(&self) -> Option<&str> {
        self.last_processed_id.as_deref()
    }

    /// Lifetime count of distinct processed ids.
    #[must_use]
    pub const fn total_processed_count(&self) -> u64 {
        self.total_processed_count
    }

    /// Received time recorded for `id`.
    #[must_use]
    pub fn received_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.processed.get(id).copied()
    }

    /// Number of ids currently in the ledger.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.processed.len()
    }
}
