//! Microsoft Graph page source.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mailpull_core::config::AppConfig;
use mailpull_core::source::{
    CredentialProvider, FetchError, Page, PageRequest, PageSource, RawMessage,
};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::dto::{GraphErrorBody, GraphMessage, ODataList};
use crate::error::{Error, Result};
use crate::{GRAPH_BASE_URL, GRAPH_SCOPE};

const MAX_ERROR_BODY: usize = 512;
const EXPIRED_SYNC_CODES: [&str; 2] = ["syncStateNotFound", "resyncRequired"];

/// Settings for [`GraphMailClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphClientSettings {
    /// API root, e.g. `https://graph.microsoft.com/v1.0`.
    pub base_url: String,
    /// Mailbox address.
    pub mailbox: String,
    /// `$select` field list.
    pub select: String,
    /// Enumerate through the `/delta` endpoint so the last page carries a
    /// change-feed token.
    pub use_delta: bool,
    /// Page size for delta requests (sent as `Prefer: odata.maxpagesize`).
    pub page_size: u32,
    /// Refuse continuation URLs outside the configured mailbox.
    pub enforce_mailbox_only: bool,
    /// Retries for throttled (429/503) responses.
    pub max_retries: u32,
    /// First backoff delay when the server sends no `Retry-After`.
    pub initial_backoff: Duration,
    /// Upper bound for any single backoff delay.
    pub max_backoff: Duration,
}

impl GraphClientSettings {
    /// Settings for the given mailbox with defaults for everything else.
    #[must_use]
    pub fn new(mailbox: impl Into<String>) -> Self {
        Self {
            base_url: GRAPH_BASE_URL.to_string(),
            mailbox: mailbox.into(),
            select: String::new(),
            use_delta: false,
            page_size: 50,
            enforce_mailbox_only: true,
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }

    /// Settings derived from the application config.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            select: config.graph.select.clone(),
            use_delta: config.graph.use_delta,
            page_size: config.mailbox.page_size,
            enforce_mailbox_only: config.security.enforce_configured_mailbox_only,
            ..Self::new(config.mailbox.address.trim())
        }
    }
}

/// [`PageSource`] backed by the Microsoft Graph mail API.
///
/// Every request carries a bearer token from the credential provider.
pub struct GraphMailClient<C> {
    http_client: Client,
    credentials: C,
    settings: GraphClientSettings,
    base: Url,
    mailbox_path: String,
    cancel: CancellationToken,
}

impl<C: CredentialProvider> GraphMailClient<C> {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the mailbox is empty.
    pub fn new(credentials: C, settings: GraphClientSettings) -> Result<Self> {
        if settings.mailbox.trim().is_empty() {
            return Err(Error::InvalidConfig("mailbox address is empty".to_string()));
        }
        let base = Url::parse(&settings.base_url)?;
        if base.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!(
                "base URL {} cannot hold a path",
                settings.base_url
            )));
        }
        let mailbox_path = normalize_path(&format!(
            "{}/",
            join_segments(&base, &["users", &settings.mailbox]).path()
        ));

        Ok(Self {
            http_client: Client::new(),
            credentials,
            settings,
            base,
            mailbox_path,
            cancel: CancellationToken::new(),
        })
    }

    /// Aborts credential waits and retry sleeps when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Client settings.
    #[must_use]
    pub const fn settings(&self) -> &GraphClientSettings {
        &self.settings
    }

    /// URL of the first page of a folder listing.
    #[must_use]
    pub fn messages_url(&self, request: &PageRequest) -> Url {
        let mut segments = vec![
            "users",
            self.settings.mailbox.as_str(),
            "mailFolders",
            request.folder.as_str(),
            "messages",
        ];
        if self.settings.use_delta {
            segments.push("delta");
        }
        let mut url = join_segments(&self.base, &segments);

        let mut query = Vec::new();
        if let Some(start) = request.start_date {
            query.push(format!(
                "$filter=receivedDateTime ge {}",
                start.format("%Y-%m-%dT%H:%M:%SZ")
            ));
        }
        if !self.settings.select.trim().is_empty() {
            query.push(format!("$select={}", self.settings.select.trim()));
        }
        if !self.settings.use_delta {
            query.push(format!("$top={}", request.page_size));
            query.push("$orderby=receivedDateTime desc".to_string());
        }
        if !query.is_empty() {
            url.set_query(Some(&query.join("&")));
        }
        url
    }

    /// URL of a message's raw MIME content.
    #[must_use]
    pub fn raw_message_url(&self, id: &str) -> Url {
        join_segments(
            &self.base,
            &["users", &self.settings.mailbox, "messages", id, "$value"],
        )
    }

    /// Parse a continuation URL and apply the mailbox restriction.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Decode`] for an unparsable URL and
    /// [`FetchError::Forbidden`] for one outside the configured mailbox.
    pub fn check_continuation(&self, token: &str) -> std::result::Result<Url, FetchError> {
        let url = Url::parse(token)
            .map_err(|e| FetchError::Decode(format!("invalid continuation URL: {e}")))?;

        if self.settings.enforce_mailbox_only {
            let same_origin = url.origin() == self.base.origin();
            let in_mailbox = normalize_path(url.path()).starts_with(&self.mailbox_path);
            if !(same_origin && in_mailbox) {
                warn!(url = %url, "Refusing continuation URL outside the configured mailbox");
                return Err(FetchError::Forbidden(format!(
                    "continuation URL is outside mailbox {}",
                    self.settings.mailbox
                )));
            }
        }
        Ok(url)
    }

    async fn get(&self, url: Url, paged: bool) -> std::result::Result<Response, FetchError> {
        let mut attempt = 0;
        loop {
            let token = self
                .credentials
                .credential(&[GRAPH_SCOPE], &self.cancel)
                .await
                .map_err(|e| FetchError::Auth(e.to_string()))?;

            let mut request = self.http_client.get(url.clone()).bearer_auth(token);
            if paged {
                request = request.header("Accept", "application/json");
                if self.settings.use_delta {
                    request = request.header(
                        "Prefer",
                        format!("odata.maxpagesize={}", self.settings.page_size),
                    );
                }
            }

            debug!(url = %url, attempt, "GET");
            let response = request
                .send()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if is_throttled(status) && attempt < self.settings.max_retries {
                let delay = retry_delay(
                    response.headers(),
                    attempt,
                    self.settings.initial_backoff,
                    self.settings.max_backoff,
                );
                attempt += 1;
                warn!(
                    status = status.as_u16(),
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Throttled, retrying"
                );
                tokio::select! {
                    () = self.cancel.cancelled() => {
                        return Err(FetchError::Transport("cancelled while backing off".to_string()));
                    }
                    () = tokio::time::sleep(delay) => {}
                }
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body));
        }
    }

    /// Fetch a page, skipping over pages that held only `@removed` entries.
    ///
    /// An empty page with a next link would end the caller's loop without
    /// advancing any stored token, so those links are followed here.
    async fn get_page(&self, url: Url) -> std::result::Result<Page, FetchError> {
        let mut url = url;
        let mut change_feed_token = None;
        loop {
            let response = self.get(url, true).await?;
            let list: ODataList<GraphMessage> = response
                .json()
                .await
                .map_err(|e| FetchError::Decode(e.to_string()))?;
            let mut page = Page::from(list);
            if page.change_feed_token.is_some() {
                change_feed_token.clone_from(&page.change_feed_token);
            }
            debug!(
                items = page.items.len(),
                has_next = page.has_next(),
                has_delta = page.change_feed_token.is_some(),
                "Fetched page"
            );

            let next = match page.next_token.take() {
                Some(next) if page.is_empty() => next,
                other => {
                    page.next_token = other;
                    page.change_feed_token = change_feed_token;
                    return Ok(page);
                }
            };
            debug!("Page held no messages, following next link");
            url = self.check_continuation(&next)?;
        }
    }
}

#[async_trait]
impl<C: CredentialProvider> PageSource for GraphMailClient<C> {
    async fn fetch_page(&self, request: &PageRequest) -> std::result::Result<Page, FetchError> {
        let url = match &request.continuation {
            Some(next) => self.check_continuation(next)?,
            None => self.messages_url(request),
        };
        self.get_page(url).await
    }

    async fn fetch_change_feed(&self, token: &str) -> std::result::Result<Page, FetchError> {
        let url = self.check_continuation(token)?;
        self.get_page(url).await
    }

    async fn fetch_raw_message(&self, id: &str) -> std::result::Result<RawMessage, FetchError> {
        let response = self.get(self.raw_message_url(id), false).await?;
        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }
}

fn join_segments(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    url.set_query(None);
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

fn normalize_path(path: &str) -> String {
    path.to_ascii_lowercase().replace("%40", "@")
}

const fn is_throttled(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
    )
}

/// Delay before retry number `attempt + 1`.
fn retry_delay(headers: &HeaderMap, attempt: u32, initial: Duration, max: Duration) -> Duration {
    let from_header = headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    from_header
        .unwrap_or_else(|| initial.saturating_mul(2u32.saturating_pow(attempt)))
        .min(max)
}

fn map_status(status: StatusCode, body: &str) -> FetchError {
    let code = serde_json::from_str::<GraphErrorBody>(body)
        .map(|b| b.error.code)
        .unwrap_or_default();

    if status == StatusCode::GONE || EXPIRED_SYNC_CODES.contains(&code.as_str()) {
        return FetchError::ContinuationExpired;
    }
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return FetchError::Auth(format!("{status}: {}", truncate(body)));
    }
    FetchError::Status {
        status: status.as_u16(),
        body: truncate(body),
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}
