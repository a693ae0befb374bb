//! Checkpoint file persistence.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::model::Checkpoint;

/// Error writing a checkpoint file.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// The file or its parent directory could not be written.
    #[error("failed to write checkpoint {}: {source}", path.display())]
    Io {
        /// Checkpoint path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The checkpoint could not be serialized.
    #[error("failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Loads and saves a [`Checkpoint`] at a fixed path.
///
/// Assumes a single writer per path: there is no locking and saves
/// overwrite the file in place.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Create a store for the given file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the checkpoint file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint.
    ///
    /// A missing, unreadable or corrupt file yields an empty checkpoint. That
    /// only costs re-downloads, so it is logged rather than returned.
    pub async fn load(&self) -> Checkpoint {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No checkpoint file, starting fresh");
                return Checkpoint::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read checkpoint, starting fresh");
                return Checkpoint::new();
            }
        };

        match serde_json::from_slice::<Checkpoint>(&data) {
            Ok(checkpoint) => {
                info!(
                    total = checkpoint.total_processed_count(),
                    tracked = checkpoint.tracked(),
                    last_sync = ?checkpoint.last_sync_timestamp(),
                    "Loaded checkpoint"
                );
                checkpoint
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt checkpoint, starting fresh");
                Checkpoint::new()
            }
        }
    }

    /// Save the checkpoint, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any filesystem step fails.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| self.io_error(source))?;
        }

        let json = serde_json::to_vec_pretty(checkpoint)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| self.io_error(source))?;

        debug!(path = %self.path.display(), "Saved checkpoint");
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
