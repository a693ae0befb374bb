//! Persistence inputs and outputs.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Metadata used to name and describe a persisted message.
///
/// All fields are resolved: the coordinator fills in fallbacks before a
/// message reaches the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMetadata {
    /// Subject line.
    pub subject: String,
    /// Received time, used for the folder name prefix.
    pub received_at: DateTime<Utc>,
    /// RFC 5322 `Message-ID`, hashed into the folder name.
    pub internet_message_id: String,
    /// Sender display name.
    pub from_name: String,
    /// Sender address.
    pub from_address: String,
    /// Conversation/thread id, if known.
    pub conversation_id: Option<String>,
}

/// Where a message was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveResult {
    /// The message folder.
    pub folder_path: PathBuf,
    /// The raw message file, if one was kept.
    pub raw_message_path: Option<PathBuf>,
    /// Extracted attachment files, in message order.
    pub attachments: Vec<PathBuf>,
    /// Final name of the message folder, including any collision suffix.
    pub folder_name: String,
    /// Whether the store declined to write the message.
    ///
    /// [`FileSystemStore`](super::FileSystemStore) never sets this.
    pub was_skipped: bool,
}
