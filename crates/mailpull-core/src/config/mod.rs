//! Application configuration.
//!
//! Settings come from a JSON file with camelCase keys. Every section has
//! defaults so a partial file loads; [`validate_config`] then reports every
//! problem at once before any run starts.

mod model;
mod validation;

pub use model::{
    AppConfig, CLIENT_SECRET_ENV, DEFAULT_CONFIG_FILE, GraphSettings, LoggingSettings,
    MailboxSettings, OutputSettings, SecuritySettings, StateSettings,
};
pub use validation::{ConfigError, ValidationResult, parse_start_date, validate_config};
