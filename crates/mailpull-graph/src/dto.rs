//! Graph JSON payloads.

use chrono::{DateTime, Utc};
use mailpull_core::source::{MailItemSummary, Page};
use serde::Deserialize;

/// An OData collection page.
#[derive(Debug, Clone, Deserialize)]
pub struct ODataList<T> {
    /// Items on this page.
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    /// URL of the next page.
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
    /// Change-feed URL, present on the last page of a delta round.
    #[serde(rename = "@odata.deltaLink")]
    pub delta_link: Option<String>,
}

/// A message resource, limited to the fields mailpull selects.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMessage {
    /// Message id.
    pub id: String,
    /// Subject line.
    pub subject: Option<String>,
    /// Received time.
    pub received_date_time: Option<DateTime<Utc>>,
    /// Whether the message has attachments.
    #[serde(default)]
    pub has_attachments: bool,
    /// RFC 5322 `Message-ID`.
    pub internet_message_id: Option<String>,
    /// Sender.
    pub from: Option<Recipient>,
    /// Conversation id.
    pub conversation_id: Option<String>,
    /// Set on delta entries for deleted messages.
    #[serde(rename = "@removed")]
    pub removed: Option<serde_json::Value>,
}

/// A sender or recipient.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    /// Name and address.
    pub email_address: Option<EmailAddress>,
}

/// Name and address pair.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailAddress {
    /// Display name.
    pub name: Option<String>,
    /// SMTP address.
    pub address: Option<String>,
}

/// Error envelope returned with non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphErrorBody {
    /// Error detail.
    pub error: GraphErrorDetail,
}

/// Error code and message.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphErrorDetail {
    /// Error code (e.g. `syncStateNotFound`).
    #[serde(default)]
    pub code: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

impl From<GraphMessage> for MailItemSummary {
    fn from(message: GraphMessage) -> Self {
        let address = message.from.and_then(|from| from.email_address);
        let (from_name, from_address) = address.map_or((None, None), |a| (a.name, a.address));

        Self {
            id: message.id,
            subject: message.subject,
            received_at: message.received_date_time,
            has_attachments: message.has_attachments,
            internet_message_id: message.internet_message_id,
            from_name,
            from_address,
            conversation_id: message.conversation_id,
        }
    }
}

impl From<ODataList<GraphMessage>> for Page {
    fn from(list: ODataList<GraphMessage>) -> Self {
        let items = list
            .value
            .into_iter()
            .filter(|message| message.removed.is_none())
            .map(MailItemSummary::from)
            .collect();

        Self {
            items,
            next_token: list.next_link,
            change_feed_token: list.delta_link,
        }
    }
}
