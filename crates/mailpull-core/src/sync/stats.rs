//! Run reports and checkpoint statistics.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::checkpoint::Checkpoint;

/// How a run walks the remote folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncMode {
    /// Date-filtered listing of the whole folder.
    FullEnumeration,
    /// Changes since the stored continuation token.
    ChangeFeed,
}

impl SyncMode {
    /// Get display name for the mode.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::FullEnumeration => "full enumeration",
            Self::ChangeFeed => "change feed",
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Messages newly persisted and marked processed.
    pub downloaded: usize,
    /// Messages already in the dedup ledger (or declined by the store).
    pub skipped: usize,
    /// Messages whose fetch or save failed; retried on the next run.
    pub failed: usize,
    /// Mode the run finished in.
    pub mode: SyncMode,
    /// The change feed expired and the run fell back to full enumeration.
    pub fell_back: bool,
    /// The run stopped early on cancellation.
    pub cancelled: bool,
    /// Dedup entries removed by retention pruning.
    pub pruned: usize,
}

impl SyncReport {
    pub(crate) const fn new(mode: SyncMode) -> Self {
        Self {
            downloaded: 0,
            skipped: 0,
            failed: 0,
            mode,
            fell_back: false,
            cancelled: false,
            pruned: 0,
        }
    }
}

/// Snapshot of checkpoint counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// Lifetime count of processed messages.
    pub total_processed: u64,
    /// When the continuation token was last updated.
    pub last_sync: Option<DateTime<Utc>>,
    /// Stored change-feed token.
    pub continuation_token: Option<String>,
    /// Entries currently in the dedup ledger.
    pub tracked: usize,
}

impl From<&Checkpoint> for SyncStats {
    fn from(checkpoint: &Checkpoint) -> Self {
        Self {
            total_processed: checkpoint.total_processed_count(),
            last_sync: checkpoint.last_sync_timestamp(),
            continuation_token: checkpoint.continuation_token().map(str::to_owned),
            tracked: checkpoint.tracked(),
        }
    }
}
