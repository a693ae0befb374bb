//! # mailpull-graph
//!
//! Microsoft Graph adapter for `mailpull-core`.
//!
//! This crate provides:
//! - [`GraphMailClient`], a page source over the Graph mail API
//!   (folder listings, delta change feed, raw MIME download)
//! - [`ClientCredentialsProvider`], app-only tokens from the identity
//!   platform with expiry-aware caching

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod auth;
mod client;
pub mod dto;
mod error;
pub mod token;

pub use auth::ClientCredentialsProvider;
pub use client::{GraphClientSettings, GraphMailClient};
pub use error::{Error, Result};
pub use token::Token;

/// Graph API root.
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Scope for app-only Graph access.
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
