//! # mailpull-core
//!
//! Incremental mailbox synchronization engine.
//!
//! This crate provides:
//! - Checkpoint store with a dedup ledger and change-feed token
//! - Page source and credential provider interfaces
//! - Sync coordinator (full enumeration and change feed)
//! - Directory-per-message persistence with attachment extraction
//! - Filesystem-safe name sanitizing
//! - Configuration model and validation
//!
//! The crate speaks no HTTP; see `mailpull-graph` for a Microsoft Graph
//! page source.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod checkpoint;
pub mod config;
mod error;
pub mod sanitize;
pub mod source;
pub mod store;
pub mod sync;

pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
pub use config::{AppConfig, ConfigError, validate_config};
pub use error::{Error, Result};
pub use sanitize::{sanitize_file_name, sanitize_folder_name};
pub use source::{
    AuthError, CredentialProvider, FetchError, MailItemSummary, Page, PageRequest, PageSource,
    RawMessage, StaticCredential,
};
pub use store::{EmailMetadata, FileSystemStore, MailStore, SaveResult, StoreError, StoreSettings};
pub use sync::{SyncCoordinator, SyncMode, SyncReport, SyncSettings, SyncStats};
