//! Directory-per-message store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha1::{Digest, Sha1};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::attachments::collect_attachments;
use super::model::{EmailMetadata, SaveResult};
use super::{MailStore, StoreError, StoreResult};
use crate::sanitize::{
    DEFAULT_FILE_NAME_LEN, DEFAULT_FOLDER_NAME_LEN, sanitize_file_name, sanitize_segment,
};
use crate::source::RawMessage;

/// Name of the raw message file inside a message folder.
pub const RAW_MESSAGE_FILE_NAME: &str = "message.eml";

const ATTACHMENTS_DIR: &str = "attachments";
const NO_ID_HASH: &str = "NOID";
const MAX_PROBES: u32 = 10_000;

/// Output options for [`FileSystemStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Directory under which message folders are created.
    pub root_dir: PathBuf,
    /// Keep the raw message as `message.eml`.
    pub save_raw: bool,
    /// Extract attachments into `attachments/`.
    pub extract_attachments: bool,
}

/// Writes each message into its own folder under a root directory.
///
/// Folder names are `{yyyyMMdd_HHmmss}__{subject}__{hash}`; the subject
/// segment is dropped when nothing survives sanitizing. Assumes it is the
/// only writer under its root.
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    settings: StoreSettings,
}

impl FileSystemStore {
    /// Create a store, creating the root directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is empty or cannot be created.
    pub fn new(settings: StoreSettings) -> StoreResult<Self> {
        if settings.root_dir.as_os_str().is_empty() {
            return Err(StoreError::Validation(
                "output root directory is empty".to_string(),
            ));
        }
        std::fs::create_dir_all(&settings.root_dir)?;
        debug!(
            root = %settings.root_dir.display(),
            save_raw = settings.save_raw,
            extract_attachments = settings.extract_attachments,
            "File system store ready"
        );
        Ok(Self { settings })
    }

    /// Store settings.
    #[must_use]
    pub const fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    async fn write_contents(
        &self,
        folder: &Path,
        raw: RawMessage,
    ) -> StoreResult<(Option<PathBuf>, Vec<PathBuf>)> {
        let StoreSettings {
            save_raw,
            extract_attachments,
            ..
        } = self.settings;

        if !save_raw && !extract_attachments {
            return Ok((None, Vec::new()));
        }

        let raw_path = folder.join(RAW_MESSAGE_FILE_NAME);
        write_stream(&raw_path, raw).await?;

        if !extract_attachments {
            return Ok((Some(raw_path), Vec::new()));
        }

        let bytes = fs::read(&raw_path).await?;
        let attachments = extract_into(folder, &bytes).await?;

        if save_raw {
            return Ok((Some(raw_path), attachments));
        }

        match fs::remove_file(&raw_path).await {
            Ok(()) => Ok((None, attachments)),
            Err(e) => {
                warn!(
                    path = %raw_path.display(),
                    error = %e,
                    "Failed to remove intermediate raw message"
                );
                Ok((Some(raw_path), attachments))
            }
        }
    }
}

#[async_trait]
impl MailStore for FileSystemStore {
    async fn save_email(
        &self,
        metadata: &EmailMetadata,
        raw: RawMessage,
    ) -> StoreResult<SaveResult> {
        let base = folder_base_name(metadata);
        let (folder_path, folder_name) = create_unique_dir(&self.settings.root_dir, &base).await?;

        match self.write_contents(&folder_path, raw).await {
            Ok((raw_message_path, attachments)) => {
                debug!(
                    folder = %folder_path.display(),
                    attachments = attachments.len(),
                    "Saved message"
                );
                Ok(SaveResult {
                    folder_path,
                    raw_message_path,
                    attachments,
                    folder_name,
                    was_skipped: false,
                })
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&folder_path).await {
                    warn!(
                        folder = %folder_path.display(),
                        error = %cleanup,
                        "Failed to remove partially written message folder"
                    );
                }
                Err(e)
            }
        }
    }
}

/// Folder name before collision suffixing.
fn folder_base_name(metadata: &EmailMetadata) -> String {
    let stamp = metadata.received_at.format("%Y%m%d_%H%M%S");
    let hash = short_hash(&metadata.internet_message_id);
    match sanitize_segment(&metadata.subject, DEFAULT_FOLDER_NAME_LEN) {
        Some(subject) => format!("{stamp}__{subject}__{hash}"),
        None => format!("{stamp}__{hash}"),
    }
}

/// First four bytes of the SHA-1 of `message_id`, as uppercase hex.
fn short_hash(message_id: &str) -> String {
    if message_id.trim().is_empty() {
        return NO_ID_HASH.to_string();
    }
    let digest = Sha1::digest(message_id.as_bytes());
    hex::encode_upper(&digest[..4])
}

/// Create `root/base`, or the first free `root/base-N`.
async fn create_unique_dir(root: &Path, base: &str) -> StoreResult<(PathBuf, String)> {
    for n in 0..=MAX_PROBES {
        let name = if n == 0 {
            base.to_string()
        } else {
            format!("{base}-{n}")
        };
        let path = root.join(&name);
        match fs::create_dir(&path).await {
            Ok(()) => return Ok((path, name)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }
    }
    Err(StoreError::Validation(format!(
        "no free folder name for {base}"
    )))
}

async fn write_stream(path: &Path, mut raw: RawMessage) -> StoreResult<u64> {
    let mut file = fs::File::create(path).await?;
    let written = tokio::io::copy(&mut raw, &mut file).await?;
    file.flush().await?;
    Ok(written)
}

async fn extract_into(folder: &Path, raw: &[u8]) -> StoreResult<Vec<PathBuf>> {
    let parts = collect_attachments(raw)?;
    if parts.is_empty() {
        return Ok(Vec::new());
    }

    let dir = folder.join(ATTACHMENTS_DIR);
    fs::create_dir_all(&dir).await?;

    let mut written = Vec::with_capacity(parts.len());
    for part in parts {
        let name = sanitize_file_name(&part.output_name(), DEFAULT_FILE_NAME_LEN);
        let (path, mut file) = create_unique_file(&dir, &name).await?;
        file.write_all(&part.body).await?;
        file.flush().await?;
        written.push(path);
    }
    Ok(written)
}

/// Create `dir/name`, or the first free `dir/stem-N.ext`.
async fn create_unique_file(dir: &Path, name: &str) -> StoreResult<(PathBuf, fs::File)> {
    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    };

    for n in 0..=MAX_PROBES {
        let candidate = if n == 0 {
            name.to_string()
        } else {
            format!("{stem}-{n}{ext}")
        };
        let path = dir.join(candidate);
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }
    }
    Err(StoreError::Validation(format!("no free file name for {name}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    const WITH_PDF: &str = "From: a@example.com\r\n\
Subject: Report\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XX\"\r\n\
\r\n\
--XX\r\n\
Content-Type: text/plain\r\n\
\r\n\
Body text\r\n\
--XX\r\n\
Content-Type: application/pdf; name=\"report.pdf\"\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
SGVsbG8gUERG\r\n\
--XX\r\n\
Content-Type: application/pdf; name=\"report.pdf\"\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
U2Vjb25k\r\n\
--XX--\r\n";

    fn store(dir: &TempDir, save_raw: bool, extract_attachments: bool) -> FileSystemStore {
        FileSystemStore::new(StoreSettings {
            root_dir: dir.path().join("out"),
            save_raw,
            extract_attachments,
        })
        .unwrap()
    }

    fn metadata(subject: &str, message_id: &str) -> EmailMetadata {
        EmailMetadata {
            subject: subject.to_string(),
            received_at: Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap(),
            internet_message_id: message_id.to_string(),
            from_name: "Alice".to_string(),
            from_address: "alice@example.com".to_string(),
            conversation_id: None,
        }
    }

    fn raw(text: &'static str) -> RawMessage {
        Box::new(std::io::Cursor::new(text.as_bytes()))
    }

    #[test]
    fn test_short_hash() {
        // SHA-1("abc") = a9993e36...
        assert_eq!(short_hash("abc"), "A9993E36");
        assert_eq!(short_hash(""), NO_ID_HASH);
        assert_eq!(short_hash("   "), NO_ID_HASH);
    }

    #[test]
    fn test_folder_base_name() {
        let name = folder_base_name(&metadata("Réunion/Q3: Report?", "abc"));
        assert_eq!(name, "20240305_140709__Reunion_Q3_ Report___A9993E36");

        let name = folder_base_name(&metadata(" ... ", ""));
        assert_eq!(name, "20240305_140709__NOID");
    }

    #[test]
    fn test_new_rejects_empty_root() {
        let result = FileSystemStore::new(StoreSettings {
            root_dir: PathBuf::new(),
            save_raw: true,
            extract_attachments: false,
        });
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_save_raw_only() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, true, false);

        let result = store
            .save_email(&metadata("Hello", "<1@x>"), raw(WITH_PDF))
            .await
            .unwrap();

        let raw_path = result.raw_message_path.unwrap();
        assert_eq!(raw_path, result.folder_path.join(RAW_MESSAGE_FILE_NAME));
        assert_eq!(std::fs::read_to_string(raw_path).unwrap(), WITH_PDF);
        assert!(result.attachments.is_empty());
        assert!(!result.was_skipped);
        assert!(result.folder_name.starts_with("20240305_140709__Hello__"));
    }

    #[tokio::test]
    async fn test_collision_gets_suffix() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, true, false);
        let meta = metadata("Same", "<same@x>");

        let first = store.save_email(&meta, raw("a")).await.unwrap();
        let second = store.save_email(&meta, raw("b")).await.unwrap();

        assert_ne!(first.folder_path, second.folder_path);
        assert_eq!(second.folder_name, format!("{}-1", first.folder_name));
        assert!(second.folder_path.is_dir());
    }

    #[tokio::test]
    async fn test_extract_without_raw() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, false, true);

        let result = store
            .save_email(&metadata("Report", "<2@x>"), raw(WITH_PDF))
            .await
            .unwrap();

        assert!(result.raw_message_path.is_none());
        assert!(!result.folder_path.join(RAW_MESSAGE_FILE_NAME).exists());
        assert_eq!(result.attachments.len(), 2);

        let names: Vec<_> = result
            .attachments
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["report.pdf", "report-1.pdf"]);
        assert_eq!(std::fs::read(&result.attachments[0]).unwrap(), b"Hello PDF");
        assert_eq!(std::fs::read(&result.attachments[1]).unwrap(), b"Second");
    }

    #[tokio::test]
    async fn test_extract_and_keep_raw() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, true, true);

        let result = store
            .save_email(&metadata("Report", "<3@x>"), raw(WITH_PDF))
            .await
            .unwrap();

        assert!(result.raw_message_path.unwrap().exists());
        assert_eq!(result.attachments.len(), 2);
    }

    #[tokio::test]
    async fn test_neither_raw_nor_attachments() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, false, false);

        let result = store
            .save_email(&metadata("Empty", "<4@x>"), raw(WITH_PDF))
            .await
            .unwrap();

        assert!(result.folder_path.is_dir());
        assert!(result.raw_message_path.is_none());
        assert!(result.attachments.is_empty());
        assert_eq!(std::fs::read_dir(&result.folder_path).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_save_removes_folder() {
        struct Broken;

        impl tokio::io::AsyncRead for Broken {
            fn poll_read(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                _buf: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Err(std::io::Error::other("connection reset")))
            }
        }

        let dir = TempDir::new().unwrap();
        let store = store(&dir, true, false);

        let result = store
            .save_email(&metadata("Broken", "<5@x>"), Box::new(Broken))
            .await;

        assert!(matches!(result, Err(StoreError::Io(_))));
        let root = dir.path().join("out");
        assert_eq!(std::fs::read_dir(root).unwrap().count(), 0);
    }
}
