//! Configuration validation.

use chrono::{DateTime, NaiveDate, Utc};

use super::model::AppConfig;

/// Largest page size the remote accepts.
const MAX_PAGE_SIZE: u32 = 1000;

/// A configuration problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Tenant id is empty.
    EmptyTenantId,
    /// Client id is empty.
    EmptyClientId,
    /// Client secret is empty.
    EmptyClientSecret,
    /// Authority host is empty.
    EmptyAuthorityHost,
    /// Mailbox address is empty.
    EmptyMailbox,
    /// Mailbox address format is invalid.
    InvalidMailbox,
    /// Folder is empty.
    EmptyFolder,
    /// Page size is out of range.
    InvalidPageSize,
    /// Start date does not parse.
    InvalidStartDate,
    /// Output root directory is empty.
    EmptyRootDirectory,
    /// Checkpoint file path is empty.
    EmptyCheckpointFile,
}

impl ConfigError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyTenantId => "Tenant id is required",
            Self::EmptyClientId => "Client id is required",
            Self::EmptyClientSecret => "Client secret is required",
            Self::EmptyAuthorityHost => "Authority host is required",
            Self::EmptyMailbox => "Mailbox address is required",
            Self::InvalidMailbox => "Invalid mailbox address format",
            Self::EmptyFolder => "Mailbox folder is required",
            Self::InvalidPageSize => "Page size must be 1-1000",
            Self::InvalidStartDate => "Start date must be RFC 3339 or YYYY-MM-DD",
            Self::EmptyRootDirectory => "Output root directory is required",
            Self::EmptyCheckpointFile => "Checkpoint file is required",
        }
    }

    /// Get the config key this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyTenantId => "graph.tenantId",
            Self::EmptyClientId => "graph.clientId",
            Self::EmptyClientSecret => "graph.clientSecret",
            Self::EmptyAuthorityHost => "graph.authorityHost",
            Self::EmptyMailbox | Self::InvalidMailbox => "mailbox.address",
            Self::EmptyFolder => "mailbox.folder",
            Self::InvalidPageSize => "mailbox.pageSize",
            Self::InvalidStartDate => "mailbox.startDateUtc",
            Self::EmptyRootDirectory => "output.rootDirectory",
            Self::EmptyCheckpointFile => "state.checkpointFile",
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field(), self.message())
    }
}

impl std::error::Error for ConfigError {}

/// Result of validating a configuration.
pub type ValidationResult = Result<(), Vec<ConfigError>>;

/// Validate a configuration.
///
/// Returns `Ok(())` if valid, or every problem found.
///
/// # Errors
///
/// Returns a vector of `ConfigError` if any settings are invalid.
pub fn validate_config(config: &AppConfig) -> ValidationResult {
    let mut errors = Vec::new();

    let graph = &config.graph;
    if graph.tenant_id.trim().is_empty() {
        errors.push(ConfigError::EmptyTenantId);
    }
    if graph.client_id.trim().is_empty() {
        errors.push(ConfigError::EmptyClientId);
    }
    if graph.client_secret.is_empty() {
        errors.push(ConfigError::EmptyClientSecret);
    }
    if graph.authority_host.trim().is_empty() {
        errors.push(ConfigError::EmptyAuthorityHost);
    }

    let mailbox = &config.mailbox;
    if mailbox.address.trim().is_empty() {
        errors.push(ConfigError::EmptyMailbox);
    } else if !is_valid_address(&mailbox.address) {
        errors.push(ConfigError::InvalidMailbox);
    }
    if mailbox.folder.trim().is_empty() {
        errors.push(ConfigError::EmptyFolder);
    }
    if !(1..=MAX_PAGE_SIZE).contains(&mailbox.page_size) {
        errors.push(ConfigError::InvalidPageSize);
    }
    let start = mailbox.start_date_utc.trim();
    if !start.is_empty() && parse_start_date(start).is_none() {
        errors.push(ConfigError::InvalidStartDate);
    }

    if config.output.root_directory.trim().is_empty() {
        errors.push(ConfigError::EmptyRootDirectory);
    }
    if config.state.checkpoint_file.trim().is_empty() {
        errors.push(ConfigError::EmptyCheckpointFile);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
#[must_use]
pub fn parse_start_date(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn is_valid_address(address: &str) -> bool {
    let Some((local, domain)) = address.trim().split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|part| !part.is_empty())
}
