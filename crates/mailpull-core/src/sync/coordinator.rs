//! Pagination and change-feed state machine.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use super::SyncSettings;
use super::stats::{SyncMode, SyncReport, SyncStats};
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::error::{Error, Result};
use crate::sanitize::EMPTY_NAME_PLACEHOLDER;
use crate::source::{FetchError, MailItemSummary, PageRequest, PageSource};
use crate::store::{EmailMetadata, MailStore};

const UNKNOWN_SENDER_NAME: &str = "Unknown sender";
const UNKNOWN_SENDER_ADDRESS: &str = "unknown@example.com";
const MAX_PAGE_SIZE: u32 = 1000;

/// Runs sync passes for one mailbox folder.
///
/// The coordinator is the only owner of the checkpoint while a run is in
/// progress. Pages and items are processed strictly in order; the only
/// suspension points are the source and store calls.
pub struct SyncCoordinator<S, M> {
    source: S,
    store: M,
    checkpoints: CheckpointStore,
    settings: SyncSettings,
    checkpoint: Checkpoint,
}

impl<S: PageSource, M: MailStore> SyncCoordinator<S, M> {
    /// Create a coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the folder is empty or the page size
    /// is out of range.
    pub fn new(
        source: S,
        store: M,
        checkpoints: CheckpointStore,
        settings: SyncSettings,
    ) -> Result<Self> {
        if settings.folder.trim().is_empty() {
            return Err(Error::Validation("folder must not be empty".to_string()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&settings.page_size) {
            return Err(Error::Validation(format!(
                "page size must be 1-{MAX_PAGE_SIZE}, got {}",
                settings.page_size
            )));
        }
        if checkpoints.path().as_os_str().is_empty() {
            return Err(Error::Validation(
                "checkpoint path must not be empty".to_string(),
            ));
        }

        Ok(Self {
            source,
            store,
            checkpoints,
            settings,
            checkpoint: Checkpoint::new(),
        })
    }

    /// Statistics of the checkpoint loaded by the last run.
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        SyncStats::from(&self.checkpoint)
    }

    /// The checkpoint as of the last run.
    #[must_use]
    pub const fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// Settings in use.
    #[must_use]
    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Run one sync pass.
    ///
    /// Loads the checkpoint, picks the mode, walks every page and saves the
    /// checkpoint. Individual message failures are logged and counted in
    /// [`SyncReport::failed`]. Cancellation ends the run early but normally.
    ///
    /// # Errors
    ///
    /// Returns an error if a page cannot be fetched, a credential cannot be
    /// obtained, or the checkpoint cannot be saved. Dedup entries recorded
    /// before a page failure are saved on a best-effort basis first.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<SyncReport> {
        self.checkpoint = self.checkpoints.load().await;

        let mode = if self.settings.use_delta && self.checkpoint.continuation_token().is_some() {
            SyncMode::ChangeFeed
        } else {
            SyncMode::FullEnumeration
        };

        let span = info_span!(
            "sync",
            mailbox = %self.settings.mailbox,
            folder = %self.settings.folder,
            mode = %mode,
        );
        self.run_mode(mode, cancel).instrument(span).await
    }

    async fn run_mode(&mut self, mode: SyncMode, cancel: &CancellationToken) -> Result<SyncReport> {
        info!("Starting sync");
        let mut report = SyncReport::new(mode);

        let outcome = match mode {
            SyncMode::FullEnumeration => self.full_enumeration(&mut report, cancel).await,
            SyncMode::ChangeFeed => match self.change_feed(&mut report, cancel).await {
                Err(Error::PageFetch(FetchError::ContinuationExpired)) => {
                    warn!("Change feed token expired, falling back to full enumeration");
                    self.checkpoint.clear_continuation();
                    self.checkpoints.save(&self.checkpoint).await?;
                    report.mode = SyncMode::FullEnumeration;
                    report.fell_back = true;
                    self.full_enumeration(&mut report, cancel).await
                }
                other => other,
            },
        };

        if let Err(e) = outcome {
            if !matches!(e, Error::Checkpoint(_)) {
                if let Err(save_err) = self.checkpoints.save(&self.checkpoint).await {
                    warn!(error = %save_err, "Failed to save checkpoint after error");
                }
            }
            return Err(e);
        }

        if let Some(days) = self.settings.retention_days {
            report.pruned = self.checkpoint.prune(days);
            if report.pruned > 0 {
                info!(removed = report.pruned, days, "Pruned checkpoint entries");
            }
        }

        self.checkpoints.save(&self.checkpoint).await?;

        info!(
            downloaded = report.downloaded,
            skipped = report.skipped,
            failed = report.failed,
            cancelled = report.cancelled,
            "Sync finished"
        );
        Ok(report)
    }

    /// Date-filtered listing. The checkpoint is saved by the caller.
    async fn full_enumeration(
        &mut self,
        report: &mut SyncReport,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut continuation = None;
        let mut pages = 0usize;

        loop {
            if cancel.is_cancelled() {
                info!(pages, "Sync cancelled");
                report.cancelled = true;
                return Ok(());
            }

            let request = PageRequest {
                folder: self.settings.folder.clone(),
                start_date: self.settings.start_date,
                page_size: self.settings.page_size,
                continuation: continuation.take(),
            };
            let page = self.source.fetch_page(&request).await?;
            pages += 1;

            if self.settings.use_delta {
                if let Some(token) = &page.change_feed_token {
                    debug!("Recorded change feed token");
                    self.checkpoint.update_continuation(token.as_str());
                }
            }

            if page.is_empty() {
                debug!(pages, "Empty page, nothing more to sync");
                return Ok(());
            }

            debug!(page = pages, items = page.items.len(), "Processing page");
            self.process_page(&page.items, report, cancel).await?;
            if report.cancelled {
                return Ok(());
            }

            match page.next_token {
                Some(next) => continuation = Some(next),
                None => return Ok(()),
            }
        }
    }

    /// Change-feed walk. The checkpoint is saved after every page.
    async fn change_feed(&mut self, report: &mut SyncReport, cancel: &CancellationToken) -> Result<()> {
        let Some(mut token) = self.checkpoint.continuation_token().map(str::to_owned) else {
            return Err(Error::Validation(
                "change feed requested without a continuation token".to_string(),
            ));
        };
        let mut pages = 0usize;

        loop {
            if cancel.is_cancelled() {
                info!(pages, "Sync cancelled");
                report.cancelled = true;
                return Ok(());
            }

            let page = self.source.fetch_change_feed(&token).await?;
            pages += 1;

            if let Some(next) = &page.change_feed_token {
                self.checkpoint.update_continuation(next.as_str());
            }

            let empty = page.is_empty();
            if !empty {
                debug!(page = pages, items = page.items.len(), "Processing change feed page");
                self.process_page(&page.items, report, cancel).await?;
            }
            self.checkpoints.save(&self.checkpoint).await?;

            if empty || report.cancelled {
                return Ok(());
            }
            match page.next_token {
                Some(next) => token = next,
                None => return Ok(()),
            }
        }
    }

    async fn process_page(
        &mut self,
        items: &[MailItemSummary],
        report: &mut SyncReport,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for item in items {
            if cancel.is_cancelled() {
                info!("Sync cancelled");
                report.cancelled = true;
                return Ok(());
            }

            if self.checkpoint.is_processed(&item.id) {
                debug!(id = %item.id, "Already processed, skipping");
                report.skipped += 1;
                continue;
            }

            match self.process_item(item).await {
                Ok(true) => report.downloaded += 1,
                Ok(false) => report.skipped += 1,
                Err(e) if e.is_item_level() => {
                    warn!(id = %item.id, error = %e, "Failed to process message, continuing");
                    report.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Fetch and persist one message. Returns `false` if the store skipped it.
    async fn process_item(&mut self, item: &MailItemSummary) -> Result<bool> {
        let item_error = |reason: String| Error::Item {
            id: item.id.clone(),
            reason,
        };

        let raw = self
            .source
            .fetch_raw_message(&item.id)
            .await
            .map_err(|e| match e {
                FetchError::Auth(reason) => Error::Auth(reason),
                other => item_error(other.to_string()),
            })?;

        let metadata = metadata_for(item);
        let saved = self
            .store
            .save_email(&metadata, raw)
            .await
            .map_err(|e| item_error(e.to_string()))?;

        if saved.was_skipped {
            debug!(id = %item.id, "Store skipped message");
            return Ok(false);
        }

        self.checkpoint
            .mark_processed(item.id.as_str(), metadata.received_at);
        info!(id = %item.id, folder = %saved.folder_name, "Downloaded message");
        Ok(true)
    }
}

/// Resolve persistence metadata, filling in fallbacks.
fn metadata_for(item: &MailItemSummary) -> EmailMetadata {
    let non_empty = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    };

    EmailMetadata {
        subject: non_empty(&item.subject).unwrap_or_else(|| EMPTY_NAME_PLACEHOLDER.to_string()),
        received_at: item.received_at.unwrap_or_else(Utc::now),
        internet_message_id: non_empty(&item.internet_message_id)
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()),
        from_name: non_empty(&item.from_name).unwrap_or_else(|| UNKNOWN_SENDER_NAME.to_string()),
        from_address: non_empty(&item.from_address)
            .unwrap_or_else(|| UNKNOWN_SENDER_ADDRESS.to_string()),
        conversation_id: non_empty(&item.conversation_id),
    }
}
