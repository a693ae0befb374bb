//! # mailpull
//!
//! Pull a mailbox from Microsoft Graph into per-message folders on disk.
//!
//! ## Commands
//!
//! - `sync` (default): download every message not yet in the checkpoint
//! - `status`: show checkpoint statistics
//! - `prune --days N`: drop dedup entries older than N days
//!
//! ## Example
//!
//! ```bash
//! MAILPULL_CLIENT_SECRET=... mailpull --config appsettings.json sync
//! mailpull status
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mailpull_core::AppConfig;
use mailpull_core::config::DEFAULT_CONFIG_FILE;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "mailpull=info,mailpull_core=info,mailpull_graph=info";
const VERBOSE_FILTER: &str = "mailpull=debug,mailpull_core=debug,mailpull_graph=debug";

/// Pull a mailbox into per-message folders.
#[derive(Parser, Debug)]
#[command(name = "mailpull")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Debug logging (ignored when `RUST_LOG` is set)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Commands {
    /// Download new messages (default)
    Sync,

    /// Show checkpoint statistics
    Status,

    /// Remove dedup entries older than the given age
    Prune {
        /// Maximum age in days
        #[arg(long)]
        days: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("mailpull: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    init_logging(config.logging.filter.as_deref(), cli.verbose);

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => commands::sync(config).await,
        Commands::Status => commands::status(&config).await,
        Commands::Prune { days } => commands::prune(&config, days).await,
    }
}

/// `RUST_LOG` wins, then the config file, then the built-in default.
fn init_logging(configured: Option<&str>, verbose: bool) {
    let fallback = if verbose {
        VERBOSE_FILTER.to_string()
    } else {
        configured
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FILTER)
            .to_string()
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
