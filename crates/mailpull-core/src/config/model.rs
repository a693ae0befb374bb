//! Configuration model types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::validation::{parse_start_date, validate_config};
use crate::error::{Error, Result};
use crate::store::StoreSettings;
use crate::sync::SyncSettings;

/// Config file used when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "appsettings.json";

/// Environment variable that overrides `graph.clientSecret`.
pub const CLIENT_SECRET_ENV: &str = "MAILPULL_CLIENT_SECRET";

/// Root of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Remote API and app registration.
    pub graph: GraphSettings,
    /// Which mailbox and folder to pull.
    pub mailbox: MailboxSettings,
    /// Where and what to write.
    pub output: OutputSettings,
    /// Checkpoint location and retention.
    pub state: StateSettings,
    /// Request restrictions.
    pub security: SecuritySettings,
    /// Log filter.
    pub logging: LoggingSettings,
}

/// Microsoft Graph app registration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphSettings {
    /// Directory (tenant) id.
    pub tenant_id: String,
    /// Application (client) id.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Token authority host.
    pub authority_host: String,
    /// Use the change feed (delta) when a token is available.
    pub use_delta: bool,
    /// Comma-separated `$select` field list for listings.
    pub select: String,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            authority_host: "https://login.microsoftonline.com".to_string(),
            use_delta: false,
            select: "id,subject,receivedDateTime,hasAttachments,internetMessageId,from,conversationId"
                .to_string(),
        }
    }
}

impl std::fmt::Debug for GraphSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphSettings")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("authority_host", &self.authority_host)
            .field("use_delta", &self.use_delta)
            .field("select", &self.select)
            .finish()
    }
}

/// Mailbox selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MailboxSettings {
    /// Mailbox address (user principal name).
    pub address: String,
    /// Folder name or well-known id.
    pub folder: String,
    /// Earliest received time, RFC 3339 or `YYYY-MM-DD`. Empty for no limit.
    pub start_date_utc: String,
    /// Items per page.
    pub page_size: u32,
}

impl Default for MailboxSettings {
    fn default() -> Self {
        Self {
            address: String::new(),
            folder: "Inbox".to_string(),
            start_date_utc: String::new(),
            page_size: 50,
        }
    }
}

/// Output options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputSettings {
    /// Root directory for message folders.
    pub root_directory: String,
    /// Keep the raw `message.eml`.
    pub save_mime_eml: bool,
    /// Extract attachments.
    pub save_attachments: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            root_directory: "./mail".to_string(),
            save_mime_eml: true,
            save_attachments: false,
        }
    }
}

/// Checkpoint options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateSettings {
    /// Checkpoint file path.
    pub checkpoint_file: String,
    /// Drop dedup entries older than this many days at the end of a run.
    pub retention_days: Option<u32>,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            checkpoint_file: "./state/checkpoint.json".to_string(),
            retention_days: None,
        }
    }
}

/// Request restrictions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecuritySettings {
    /// Refuse continuation URLs that point outside the configured mailbox.
    pub enforce_configured_mailbox_only: bool,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            enforce_configured_mailbox_only: true,
        }
    }
}

/// Logging options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `tracing` filter directive, used when `RUST_LOG` is unset.
    pub filter: Option<String>,
}

impl AppConfig {
    /// Read a config file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config.with_client_secret_override(std::env::var(CLIENT_SECRET_ENV).ok()))
    }

    /// Replace the client secret when `secret` is non-empty.
    #[must_use]
    pub fn with_client_secret_override(mut self, secret: Option<String>) -> Self {
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            self.graph.client_secret = secret;
        }
        self
    }

    /// Validate, turning problems into [`Error::Config`].
    ///
    /// # Errors
    ///
    /// Returns every validation problem found.
    pub fn validated(self) -> Result<Self> {
        validate_config(&self).map_err(Error::Config)?;
        Ok(self)
    }

    /// Coordinator settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the start date does not parse.
    pub fn sync_settings(&self) -> Result<SyncSettings> {
        let start_date = match self.mailbox.start_date_utc.trim() {
            "" => None,
            raw => Some(parse_start_date(raw).ok_or_else(|| {
                Error::Validation(format!("invalid start date: {raw}"))
            })?),
        };
        Ok(SyncSettings {
            mailbox: self.mailbox.address.trim().to_string(),
            folder: self.mailbox.folder.trim().to_string(),
            start_date,
            page_size: self.mailbox.page_size,
            use_delta: self.graph.use_delta,
            retention_days: self.state.retention_days,
        })
    }

    /// Mail store settings.
    #[must_use]
    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            root_dir: PathBuf::from(self.output.root_directory.trim()),
            save_raw: self.output.save_mime_eml,
            extract_attachments: self.output.save_attachments,
        }
    }

    /// Checkpoint file path.
    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        PathBuf::from(self.state.checkpoint_file.trim())
    }
}
