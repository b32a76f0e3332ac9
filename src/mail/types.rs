//! Message representations — the flat stored shape and the provider-shaped
//! header list.

use serde::{Deserialize, Serialize};

/// Label the provider attaches to unread messages.
pub const UNREAD_LABEL: &str = "UNREAD";

/// Label for the primary inbox.
pub const INBOX_LABEL: &str = "INBOX";

/// A message in its flat, persisted form.
///
/// `recipient` and `body` are `None` when the source that produced the
/// message did not carry the field at all (as opposed to carrying it empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Provider message ID. Never changes.
    pub id: String,
    pub sender: String,
    #[serde(default)]
    pub recipient: Option<String>,
    pub subject: String,
    /// Date as the provider formatted it (RFC 2822 header or epoch millis).
    pub date: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Message {
    /// Create a message with only an ID; every other field empty.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sender: String::new(),
            recipient: None,
            subject: String::new(),
            date: String::new(),
            body: None,
            is_read: false,
            labels: Vec::new(),
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set read-state, keeping the `UNREAD` label in step.
    pub fn set_read(&mut self, read: bool) {
        self.is_read = read;
        if read {
            self.labels.retain(|l| l != UNREAD_LABEL);
        } else if !self.labels.iter().any(|l| l == UNREAD_LABEL) {
            self.labels.push(UNREAD_LABEL.to_string());
        }
    }
}

/// A single `name: value` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A message as the mail provider returns it: headers as a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMessage {
    pub id: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    /// Plain-text body, or the provider snippet when no text part exists.
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
    /// Provider receive time in epoch milliseconds.
    #[serde(default)]
    pub internal_date: Option<String>,
}

impl HeaderMessage {
    /// Case-insensitive header lookup; first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// The `Date` header, falling back to the provider's internal date.
    pub fn date(&self) -> &str {
        self.header("Date")
            .or(self.internal_date.as_deref())
            .unwrap_or("")
    }

    pub fn is_read(&self) -> bool {
        !self.label_ids.iter().any(|l| l == UNREAD_LABEL)
    }

    /// Mirror a read-state change into the label list.
    pub fn set_read(&mut self, read: bool) {
        if read {
            self.label_ids.retain(|l| l != UNREAD_LABEL);
        } else if self.is_read() {
            self.label_ids.push(UNREAD_LABEL.to_string());
        }
    }

    /// Flatten into the stored representation.
    pub fn into_message(self) -> Message {
        let sender = self.header("From").unwrap_or("").to_string();
        let recipient = Some(self.header("To").unwrap_or("").to_string());
        let subject = self.header("Subject").unwrap_or("").to_string();
        let date = self.date().to_string();
        let is_read = self.is_read();
        Message {
            id: self.id,
            sender,
            recipient,
            subject,
            date,
            body: Some(self.body.unwrap_or_default()),
            is_read,
            labels: self.label_ids,
        }
    }
}
