//! Sync coordinator scenarios against an in-memory page source.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use mailpull_core::{
    Checkpoint, CheckpointStore, Error, FetchError, FileSystemStore, MailItemSummary, Page,
    PageRequest, PageSource, RawMessage, StoreSettings, SyncCoordinator, SyncMode, SyncSettings,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Calls {
    pages: Vec<PageRequest>,
    change_feed: Vec<String>,
    raw: Vec<String>,
    /// Ledger size on disk at each page or change-feed request.
    tracked_on_disk: Vec<usize>,
}

#[derive(Default)]
struct MockSource {
    pages: Mutex<VecDeque<Result<Page, FetchError>>>,
    changes: Mutex<VecDeque<Result<Page, FetchError>>>,
    failing: Mutex<HashMap<String, FetchError>>,
    calls: Arc<Mutex<Calls>>,
    watched_checkpoint: Option<PathBuf>,
    cancel_after_raw: Option<(usize, CancellationToken)>,
}

impl MockSource {
    fn new() -> Self {
        Self::default()
    }

    fn page(self, page: Result<Page, FetchError>) -> Self {
        self.pages.lock().unwrap().push_back(page);
        self
    }

    fn change(self, page: Result<Page, FetchError>) -> Self {
        self.changes.lock().unwrap().push_back(page);
        self
    }

    fn fail_raw(self, id: &str, err: FetchError) -> Self {
        self.failing.lock().unwrap().insert(id.to_string(), err);
        self
    }

    fn watch_checkpoint(mut self, checkpoint: &Path) -> Self {
        self.watched_checkpoint = Some(checkpoint.to_path_buf());
        self
    }

    fn cancel_after_raw(mut self, count: usize, token: CancellationToken) -> Self {
        self.cancel_after_raw = Some((count, token));
        self
    }

    fn calls(&self) -> Arc<Mutex<Calls>> {
        Arc::clone(&self.calls)
    }

    fn record_disk_state(&self) {
        if let Some(path) = &self.watched_checkpoint {
            let tracked = std::fs::read(path)
                .ok()
                .and_then(|data| serde_json::from_slice::<Checkpoint>(&data).ok())
                .map_or(0, |checkpoint| checkpoint.tracked());
            self.calls.lock().unwrap().tracked_on_disk.push(tracked);
        }
    }
}

#[async_trait]
impl PageSource for MockSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError> {
        self.record_disk_state();
        self.calls.lock().unwrap().pages.push(request.clone());
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Page::default()))
    }

    async fn fetch_change_feed(&self, token: &str) -> Result<Page, FetchError> {
        self.record_disk_state();
        self.calls.lock().unwrap().change_feed.push(token.to_string());
        self.changes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Page::default()))
    }

    async fn fetch_raw_message(&self, id: &str) -> Result<RawMessage, FetchError> {
        let fetched = {
            let mut calls = self.calls.lock().unwrap();
            calls.raw.push(id.to_string());
            calls.raw.len()
        };
        if let Some((count, token)) = &self.cancel_after_raw {
            if fetched >= *count {
                token.cancel();
            }
        }
        if let Some(err) = self.failing.lock().unwrap().remove(id) {
            return Err(err);
        }
        let body = format!("Subject: {id}\r\nMessage-ID: <{id}@test>\r\n\r\nbody {id}\r\n");
        Ok(Box::new(Cursor::new(body.into_bytes())))
    }
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn checkpoint_path(&self) -> PathBuf {
        self.dir.path().join("state").join("checkpoint.json")
    }

    fn out_dir(&self) -> PathBuf {
        self.dir.path().join("mail")
    }

    fn coordinator(
        &self,
        source: MockSource,
        use_delta: bool,
    ) -> SyncCoordinator<MockSource, FileSystemStore> {
        self.coordinator_with(source, settings(use_delta))
    }

    fn coordinator_with(
        &self,
        source: MockSource,
        settings: SyncSettings,
    ) -> SyncCoordinator<MockSource, FileSystemStore> {
        let store = FileSystemStore::new(StoreSettings {
            root_dir: self.out_dir(),
            save_raw: true,
            extract_attachments: false,
        })
        .unwrap();
        SyncCoordinator::new(
            source,
            store,
            CheckpointStore::new(self.checkpoint_path()),
            settings,
        )
        .unwrap()
    }

    async fn saved(&self) -> Checkpoint {
        CheckpointStore::new(self.checkpoint_path()).load().await
    }

    async fn seed(&self, checkpoint: &Checkpoint) {
        CheckpointStore::new(self.checkpoint_path())
            .save(checkpoint)
            .await
            .unwrap();
    }

    fn folder_count(&self) -> usize {
        std::fs::read_dir(self.out_dir()).unwrap().count()
    }
}

fn settings(use_delta: bool) -> SyncSettings {
    SyncSettings {
        mailbox: "user@contoso.com".to_string(),
        folder: "Inbox".to_string(),
        start_date: None,
        page_size: 50,
        use_delta,
        retention_days: None,
    }
}

fn item(id: &str) -> MailItemSummary {
    MailItemSummary::new(id)
        .with_subject(format!("Message {id}"))
        .with_received_at(Utc::now())
        .with_internet_message_id(format!("<{id}@test>"))
}

fn page(ids: &[&str]) -> Page {
    Page::new(ids.iter().map(|id| item(id)).collect())
}

#[tokio::test]
async fn test_item_failure_is_isolated() {
    let fixture = Fixture::new();
    let source = MockSource::new()
        .page(Ok(page(&["a", "b", "c"])))
        .fail_raw("b", FetchError::Transport("connection reset".to_string()));
    let mut coordinator = fixture.coordinator(source, false);

    let report = coordinator.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.downloaded, 2);
    assert_eq!(report.failed, 1);
    assert!(!report.cancelled);

    let saved = fixture.saved().await;
    assert!(saved.is_processed("a"));
    assert!(!saved.is_processed("b"));
    assert!(saved.is_processed("c"));
    assert_eq!(saved.total_processed_count(), 2);
    assert_eq!(fixture.folder_count(), 2);
}

#[tokio::test]
async fn test_full_enumeration_follows_next_tokens() {
    let fixture = Fixture::new();
    let source = MockSource::new()
        .page(Ok(page(&["a", "b"]).with_next_token("page-2")))
        .page(Ok(page(&["c"])));
    let calls = source.calls();
    let mut coordinator = fixture.coordinator(source, false);

    let report = coordinator.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.downloaded, 3);
    assert_eq!(report.mode, SyncMode::FullEnumeration);
    let calls = calls.lock().unwrap();
    assert_eq!(calls.pages.len(), 2);
    assert_eq!(calls.pages[0].continuation, None);
    assert_eq!(calls.pages[0].page_size, 50);
    assert_eq!(calls.pages[1].continuation.as_deref(), Some("page-2"));
    assert!(calls.change_feed.is_empty());
}

#[tokio::test]
async fn test_rerun_skips_processed_items() {
    let fixture = Fixture::new();

    let source = MockSource::new().page(Ok(page(&["a", "b"])));
    let first = fixture
        .coordinator(source, false)
        .run(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.downloaded, 2);

    let source = MockSource::new().page(Ok(page(&["a", "b", "c"])));
    let calls = source.calls();
    let mut coordinator = fixture.coordinator(source, false);
    let second = coordinator.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(second.downloaded, 1);
    assert_eq!(second.skipped, 2);
    assert_eq!(calls.lock().unwrap().raw, ["c"]);
    assert_eq!(coordinator.stats().total_processed, 3);
    assert_eq!(fixture.folder_count(), 3);
}

#[tokio::test]
async fn test_change_feed_skips_full_enumeration() {
    let fixture = Fixture::new();
    let mut seed = Checkpoint::new();
    seed.update_continuation("delta-1");
    fixture.seed(&seed).await;

    let source = MockSource::new().change(Ok(page(&["x"]).with_change_feed_token("delta-2")));
    let calls = source.calls();
    let mut coordinator = fixture.coordinator(source, true);

    let report = coordinator.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.mode, SyncMode::ChangeFeed);
    assert_eq!(report.downloaded, 1);
    let calls = calls.lock().unwrap();
    assert!(calls.pages.is_empty());
    assert_eq!(calls.change_feed, ["delta-1"]);
    assert_eq!(fixture.saved().await.continuation_token(), Some("delta-2"));
}

#[tokio::test]
async fn test_stored_token_ignored_without_delta() {
    let fixture = Fixture::new();
    let mut seed = Checkpoint::new();
    seed.update_continuation("delta-1");
    fixture.seed(&seed).await;

    let source = MockSource::new().page(Ok(page(&["a"])));
    let calls = source.calls();
    let report = fixture
        .coordinator(source, false)
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.mode, SyncMode::FullEnumeration);
    assert!(calls.lock().unwrap().change_feed.is_empty());
}

#[tokio::test]
async fn test_change_feed_saves_after_every_page() {
    let fixture = Fixture::new();
    let mut seed = Checkpoint::new();
    seed.update_continuation("delta-1");
    fixture.seed(&seed).await;

    let source = MockSource::new()
        .change(Ok(page(&["a"]).with_next_token("delta-1b")))
        .change(Ok(page(&["b"]).with_change_feed_token("delta-2")))
        .watch_checkpoint(&fixture.checkpoint_path());
    let calls = source.calls();
    let mut coordinator = fixture.coordinator(source, true);

    coordinator.run(&CancellationToken::new()).await.unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.change_feed, ["delta-1", "delta-1b"]);
    assert_eq!(calls.tracked_on_disk, [0, 1]);
    assert_eq!(fixture.saved().await.continuation_token(), Some("delta-2"));
}

#[tokio::test]
async fn test_full_enumeration_saves_once_at_end() {
    let fixture = Fixture::new();
    let source = MockSource::new()
        .page(Ok(page(&["a"]).with_next_token("page-2")))
        .page(Ok(page(&["b"])))
        .watch_checkpoint(&fixture.checkpoint_path());
    let calls = source.calls();
    let mut coordinator = fixture.coordinator(source, false);

    coordinator.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(calls.lock().unwrap().tracked_on_disk, [0, 0]);
    assert_eq!(fixture.saved().await.tracked(), 2);
}

#[tokio::test]
async fn test_empty_change_feed_page_still_advances_token() {
    let fixture = Fixture::new();
    let mut seed = Checkpoint::new();
    seed.update_continuation("delta-1");
    fixture.seed(&seed).await;

    let source = MockSource::new().change(Ok(Page::default().with_change_feed_token("delta-3")));
    let report = fixture
        .coordinator(source, true)
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.downloaded, 0);
    assert_eq!(fixture.saved().await.continuation_token(), Some("delta-3"));
}

#[tokio::test]
async fn test_full_enumeration_records_change_feed_token() {
    let fixture = Fixture::new();
    let source = MockSource::new().page(Ok(page(&["a"]).with_change_feed_token("delta-1")));
    let calls = source.calls();
    let mut coordinator = fixture.coordinator(source, true);

    let report = coordinator.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.mode, SyncMode::FullEnumeration);
    assert!(calls.lock().unwrap().change_feed.is_empty());
    assert_eq!(fixture.saved().await.continuation_token(), Some("delta-1"));
}

#[tokio::test]
async fn test_expired_change_feed_falls_back() {
    let fixture = Fixture::new();
    let mut seed = Checkpoint::new();
    seed.update_continuation("stale");
    fixture.seed(&seed).await;

    let source = MockSource::new()
        .change(Err(FetchError::ContinuationExpired))
        .page(Ok(page(&["a"]).with_change_feed_token("fresh")));
    let calls = source.calls();
    let mut coordinator = fixture.coordinator(source, true);

    let report = coordinator.run(&CancellationToken::new()).await.unwrap();

    assert!(report.fell_back);
    assert_eq!(report.mode, SyncMode::FullEnumeration);
    assert_eq!(report.downloaded, 1);
    let calls = calls.lock().unwrap();
    assert_eq!(calls.change_feed, ["stale"]);
    assert_eq!(calls.pages.len(), 1);
    assert_eq!(fixture.saved().await.continuation_token(), Some("fresh"));
}

#[tokio::test]
async fn test_second_expiry_during_fallback_propagates() {
    let fixture = Fixture::new();
    let mut seed = Checkpoint::new();
    seed.update_continuation("stale");
    fixture.seed(&seed).await;

    let source = MockSource::new()
        .change(Err(FetchError::ContinuationExpired))
        .page(Err(FetchError::ContinuationExpired));
    let calls = source.calls();
    let mut coordinator = fixture.coordinator(source, true);

    let result = coordinator.run(&CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(Error::PageFetch(FetchError::ContinuationExpired))
    ));
    let calls = calls.lock().unwrap();
    assert_eq!(calls.change_feed, ["stale"]);
    assert_eq!(calls.pages.len(), 1);
    assert_eq!(fixture.saved().await.continuation_token(), None);
}

#[tokio::test]
async fn test_start_date_reaches_every_page_request() {
    let fixture = Fixture::new();
    let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
    let source = MockSource::new()
        .page(Ok(page(&["a"]).with_next_token("page-2")))
        .page(Ok(page(&["b"])));
    let calls = source.calls();

    let mut settings = settings(false);
    settings.start_date = Some(start);
    let mut coordinator = fixture.coordinator_with(source, settings);

    coordinator.run(&CancellationToken::new()).await.unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.pages.len(), 2);
    assert!(calls.pages.iter().all(|request| request.start_date == Some(start)));
    assert!(calls.pages.iter().all(|request| request.folder == "Inbox"));
}

#[tokio::test]
async fn test_page_error_propagates_and_keeps_progress() {
    let fixture = Fixture::new();
    let source = MockSource::new()
        .page(Ok(page(&["a"]).with_next_token("page-2")))
        .page(Err(FetchError::Status {
            status: 500,
            body: "boom".to_string(),
        }));
    let mut coordinator = fixture.coordinator(source, false);

    let result = coordinator.run(&CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(Error::PageFetch(FetchError::Status { status: 500, .. }))
    ));
    assert!(fixture.saved().await.is_processed("a"));
}

#[tokio::test]
async fn test_auth_error_on_item_is_fatal() {
    let fixture = Fixture::new();
    let source = MockSource::new()
        .page(Ok(page(&["a", "b", "c"])))
        .fail_raw("b", FetchError::Auth("token revoked".to_string()));
    let calls = source.calls();
    let mut coordinator = fixture.coordinator(source, false);

    let result = coordinator.run(&CancellationToken::new()).await;

    assert!(matches!(result, Err(Error::Auth(_))));
    assert_eq!(calls.lock().unwrap().raw, ["a", "b"]);
    assert!(fixture.saved().await.is_processed("a"));
}

#[tokio::test]
async fn test_cancel_before_run() {
    let fixture = Fixture::new();
    let source = MockSource::new().page(Ok(page(&["a"])));
    let calls = source.calls();
    let mut coordinator = fixture.coordinator(source, false);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = coordinator.run(&cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.downloaded, 0);
    assert!(calls.lock().unwrap().pages.is_empty());
    assert!(fixture.checkpoint_path().exists());
}

#[tokio::test]
async fn test_cancel_between_items_keeps_finished_work() {
    let fixture = Fixture::new();
    let cancel = CancellationToken::new();
    let source = MockSource::new()
        .page(Ok(page(&["a", "b", "c"]).with_next_token("page-2")))
        .cancel_after_raw(1, cancel.clone());
    let calls = source.calls();
    let mut coordinator = fixture.coordinator(source, false);

    let report = coordinator.run(&cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.downloaded, 1);
    let calls = calls.lock().unwrap();
    assert_eq!(calls.raw, ["a"]);
    assert_eq!(calls.pages.len(), 1);
    assert!(fixture.saved().await.is_processed("a"));
}

#[tokio::test]
async fn test_checkpoint_save_failure_is_fatal() {
    let fixture = Fixture::new();
    std::fs::create_dir_all(fixture.checkpoint_path()).unwrap();
    let source = MockSource::new().page(Ok(page(&["a"])));
    let mut coordinator = fixture.coordinator(source, false);

    let result = coordinator.run(&CancellationToken::new()).await;

    assert!(matches!(result, Err(Error::Checkpoint(_))));
}

#[tokio::test]
async fn test_retention_prunes_old_entries() {
    let fixture = Fixture::new();
    let mut seed = Checkpoint::new();
    seed.mark_processed("old", Utc::now() - Duration::days(60));
    seed.mark_processed("recent", Utc::now() - Duration::days(1));
    fixture.seed(&seed).await;

    let mut settings = settings(false);
    settings.retention_days = Some(30);
    let mut coordinator = fixture.coordinator_with(MockSource::new(), settings);

    let report = coordinator.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.pruned, 1);
    let saved = fixture.saved().await;
    assert!(!saved.is_processed("old"));
    assert!(saved.is_processed("recent"));
    assert_eq!(saved.total_processed_count(), 2);
}

#[test]
fn test_new_rejects_invalid_settings() {
    let fixture = Fixture::new();
    let store = || {
        FileSystemStore::new(StoreSettings {
            root_dir: fixture.out_dir(),
            save_raw: true,
            extract_attachments: false,
        })
        .unwrap()
    };

    let mut bad_folder = settings(false);
    bad_folder.folder = "  ".to_string();
    let result = SyncCoordinator::new(
        MockSource::new(),
        store(),
        CheckpointStore::new(fixture.checkpoint_path()),
        bad_folder,
    );
    assert!(matches!(result, Err(Error::Validation(_))));

    let mut bad_page_size = settings(false);
    bad_page_size.page_size = 0;
    let result = SyncCoordinator::new(
        MockSource::new(),
        store(),
        CheckpointStore::new(fixture.checkpoint_path()),
        bad_page_size,
    );
    assert!(matches!(result, Err(Error::Validation(_))));
}
