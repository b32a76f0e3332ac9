//! Field extraction over the two message representations.

use std::borrow::Cow;

use crate::mail::types::{HeaderMessage, Message};
use crate::rules::model::Field;

/// A borrowed message, tagged with its representation.
///
/// Each variant has its own resolver; there is no string-keyed lookup.
#[derive(Debug, Clone, Copy)]
pub enum MessageView<'a> {
    /// Stored message with named fields.
    Flat(&'a Message),
    /// Provider message with a header list.
    Headers(&'a HeaderMessage),
}

impl<'a> MessageView<'a> {
    /// Resolve a logical field.
    ///
    /// `None` means the representation does not carry the field at all;
    /// a carried-but-unset field is `Some("")`.
    pub fn extract(&self, field: Field) -> Option<Cow<'a, str>> {
        match *self {
            Self::Flat(msg) => extract_flat(msg, field),
            Self::Headers(msg) => Some(extract_headers(msg, field)),
        }
    }

    pub fn id(&self) -> &'a str {
        match *self {
            Self::Flat(msg) => &msg.id,
            Self::Headers(msg) => &msg.id,
        }
    }
}

fn extract_flat(msg: &Message, field: Field) -> Option<Cow<'_, str>> {
    match field {
        Field::Sender => Some(Cow::Borrowed(&msg.sender)),
        Field::Subject => Some(Cow::Borrowed(&msg.subject)),
        Field::Date => Some(Cow::Borrowed(&msg.date)),
        Field::Recipient => msg.recipient.as_deref().map(Cow::Borrowed),
        Field::Body => msg.body.as_deref().map(Cow::Borrowed),
    }
}

fn extract_headers(msg: &HeaderMessage, field: Field) -> Cow<'_, str> {
    let value = match field {
        Field::Sender => msg.header("From"),
        Field::Subject => msg.header("Subject"),
        Field::Recipient => msg.header("To"),
        Field::Date => Some(msg.date()),
        Field::Body => msg.body.as_deref(),
    };
    Cow::Borrowed(value.unwrap_or(""))
}

/// A message the engine driver can evaluate and update.
pub trait Envelope {
    fn view(&self) -> MessageView<'_>;

    fn id(&self) -> &str;

    fn is_read(&self) -> bool;

    /// Mirror a read-state change after a successful dispatch.
    fn set_read(&mut self, read: bool);
}

impl Envelope for Message {
    fn view(&self) -> MessageView<'_> {
        MessageView::Flat(self)
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn is_read(&self) -> bool {
        self.is_read
    }

    fn set_read(&mut self, read: bool) {
        Message::set_read(self, read);
    }
}

impl Envelope for HeaderMessage {
    fn view(&self) -> MessageView<'_> {
        MessageView::Headers(self)
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn is_read(&self) -> bool {
        HeaderMessage::is_read(self)
    }

    fn set_read(&mut self, read: bool) {
        HeaderMessage::set_read(self, read);
    }
}
