//! Page and item types exchanged with a page source.

use chrono::{DateTime, Utc};

/// One entry of a remote mail listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailItemSummary {
    /// Opaque remote id, the dedup key.
    pub id: String,
    /// Subject line.
    pub subject: Option<String>,
    /// When the message was received.
    pub received_at: Option<DateTime<Utc>>,
    /// Whether the remote side reports attachments.
    pub has_attachments: bool,
    /// RFC 5322 `Message-ID`, used for folder name hashing.
    pub internet_message_id: Option<String>,
    /// Sender display name.
    pub from_name: Option<String>,
    /// Sender address.
    pub from_address: Option<String>,
    /// Conversation/thread id.
    pub conversation_id: Option<String>,
}

impl MailItemSummary {
    /// Create a summary with only an id set.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Set the subject.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the received time.
    #[must_use]
    pub const fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    /// Set the internet message id.
    #[must_use]
    pub fn with_internet_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.internet_message_id = Some(message_id.into());
        self
    }

    /// Set the sender.
    #[must_use]
    pub fn with_from(mut self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.from_name = Some(name.into());
        self.from_address = Some(address.into());
        self
    }
}

/// A page of listing results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Items in remote order.
    pub items: Vec<MailItemSummary>,
    /// Token for the next page; `None` on the last page.
    pub next_token: Option<String>,
    /// Change-feed token, present only where the remote offers one.
    pub change_feed_token: Option<String>,
}

impl Page {
    /// Create a page with the given items and no tokens.
    #[must_use]
    pub const fn new(items: Vec<MailItemSummary>) -> Self {
        Self {
            items,
            next_token: None,
            change_feed_token: None,
        }
    }

    /// Set the next-page token.
    #[must_use]
    pub fn with_next_token(mut self, token: impl Into<String>) -> Self {
        self.next_token = Some(token.into());
        self
    }

    /// Set the change-feed token.
    #[must_use]
    pub fn with_change_feed_token(mut self, token: impl Into<String>) -> Self {
        self.change_feed_token = Some(token.into());
        self
    }

    /// Whether the page has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether another page follows.
    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.next_token.is_some()
    }
}

/// Parameters for a full-enumeration page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Remote folder name or id.
    pub folder: String,
    /// Only messages received at or after this time.
    pub start_date: Option<DateTime<Utc>>,
    /// Maximum items per page.
    pub page_size: u32,
    /// Token from the previous page; `None` for the first request.
    pub continuation: Option<String>,
}
