//! Subcommand implementations.

use anyhow::{Context, Result, bail};
use mailpull_core::{AppConfig, CheckpointStore, FileSystemStore, SyncCoordinator, SyncStats};
use mailpull_graph::{ClientCredentialsProvider, GraphClientSettings, GraphMailClient};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run one sync pass until done or Ctrl-C.
pub async fn sync(config: AppConfig) -> Result<()> {
    let config = config.validated()?;
    let cancel = CancellationToken::new();

    let credentials = ClientCredentialsProvider::from_settings(&config.graph)
        .context("Failed to set up token provider")?;
    let source = GraphMailClient::new(credentials, GraphClientSettings::from_config(&config))
        .context("Failed to set up Graph client")?
        .with_cancellation(cancel.clone());
    let store = FileSystemStore::new(config.store_settings())
        .context("Failed to prepare output directory")?;

    let mut coordinator = SyncCoordinator::new(
        source,
        store,
        CheckpointStore::new(config.checkpoint_path()),
        config.sync_settings()?,
    )?;

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing current message");
            ctrl_c.cancel();
        }
    });

    let report = coordinator.run(&cancel).await?;
    let stats = coordinator.stats();

    info!(
        downloaded = report.downloaded,
        skipped = report.skipped,
        failed = report.failed,
        total = stats.total_processed,
        "Done"
    );
    println!(
        "{} downloaded, {} skipped, {} failed ({}{})",
        report.downloaded,
        report.skipped,
        report.failed,
        report.mode,
        if report.cancelled { ", cancelled" } else { "" }
    );
    Ok(())
}

/// Print checkpoint statistics.
pub async fn status(config: &AppConfig) -> Result<()> {
    let checkpoints = checkpoint_store(config)?;
    let checkpoint = checkpoints.load().await;
    let stats = SyncStats::from(&checkpoint);

    println!("Checkpoint:      {}", checkpoints.path().display());
    println!("Total processed: {}", stats.total_processed);
    println!("Tracked ids:     {}", stats.tracked);
    println!(
        "Last sync:       {}",
        stats
            .last_sync
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
    );
    println!(
        "Change feed:     {}",
        if stats.continuation_token.is_some() { "stored" } else { "none" }
    );
    Ok(())
}

/// Drop dedup entries older than `days` and save.
pub async fn prune(config: &AppConfig, days: u32) -> Result<()> {
    let checkpoints = checkpoint_store(config)?;
    let mut checkpoint = checkpoints.load().await;
    let removed = checkpoint.prune(days);
    checkpoints
        .save(&checkpoint)
        .await
        .context("Failed to save checkpoint")?;

    info!(removed, days, "Pruned checkpoint");
    println!("Removed {removed} entries older than {days} days");
    Ok(())
}

fn checkpoint_store(config: &AppConfig) -> Result<CheckpointStore> {
    let path = config.checkpoint_path();
    if path.as_os_str().is_empty() {
        bail!("state.checkpointFile is not set");
    }
    Ok(CheckpointStore::new(path))
}
