//! Mail source — the remote mailbox the engine reads from and acts on.

pub mod gmail;
pub mod types;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{self, MailError};
use crate::rules::engine::{ActionDispatcher, RulesEngine, RunReport};
use crate::rules::model::Action;
use crate::store::{MessageStore, MessageUpdate};

pub use gmail::{GmailClient, GmailConfig};
pub use types::{Header, HeaderMessage, INBOX_LABEL, Message, UNREAD_LABEL};

/// Remote mailbox operations. Pure I/O, no rule logic.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// IDs of the messages to process, newest first.
    async fn list_message_ids(&self) -> Result<Vec<String>, MailError>;

    async fn get_message(&self, id: &str) -> Result<HeaderMessage, MailError>;

    async fn set_read_state(&self, id: &str, read: bool) -> Result<(), MailError>;

    async fn add_label(&self, id: &str, label: &str) -> Result<(), MailError>;

    async fn remove_label(&self, id: &str, label: &str) -> Result<(), MailError>;
}

/// Translates rule actions into mail source calls.
pub struct MailDispatcher<'a, S: MailSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: MailSource + ?Sized> MailDispatcher<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<'a, S: MailSource + ?Sized> ActionDispatcher for MailDispatcher<'a, S> {
    async fn dispatch(&self, message_id: &str, action: &Action) -> Result<(), MailError> {
        debug!(message_id, action = action.label(), "Dispatching action");
        match action {
            Action::MarkAsRead => self.source.set_read_state(message_id, true).await,
            Action::MarkAsUnread => self.source.set_read_state(message_id, false).await,
            Action::MoveMessage { destination } => {
                self.source.add_label(message_id, destination).await?;
                if !destination.eq_ignore_ascii_case(INBOX_LABEL) {
                    self.source.remove_label(message_id, INBOX_LABEL).await?;
                }
                Ok(())
            }
        }
    }
}

/// Fetch every listed message, flatten it, and upsert the batch into the store.
pub async fn fetch_messages(
    source: &dyn MailSource,
    store: &dyn MessageStore,
) -> error::Result<Vec<Message>> {
    let ids = source.list_message_ids().await?;
    debug!(count = ids.len(), "Listed message ids");

    let mut messages = Vec::with_capacity(ids.len());
    for id in &ids {
        let message = source.get_message(id).await?;
        messages.push(message.into_message());
    }

    store.upsert(&messages).await?;
    info!(count = messages.len(), "Fetched and stored messages");
    Ok(messages)
}

/// Run the rules over every stored message, dispatching through `source`.
///
/// Read-state changes that reached the mailbox are written back to the
/// store. Dispatch failures stay in the returned report.
pub async fn process_messages(
    engine: &RulesEngine,
    source: &dyn MailSource,
    store: &dyn MessageStore,
) -> error::Result<RunReport> {
    let mut messages = store.get_all().await?;
    let dispatcher = MailDispatcher::new(source);
    let report = engine.run(&mut messages, &dispatcher).await;

    let mut persisted: Vec<&str> = Vec::new();
    for (id, _) in &report.read_state_changes {
        if persisted.contains(&id.as_str()) {
            continue;
        }
        if let Some(message) = messages.iter().find(|m| &m.id == id) {
            let update = MessageUpdate {
                is_read: Some(message.is_read),
                labels: Some(message.labels.clone()),
            };
            store.update_fields(id, &update).await?;
        }
        persisted.push(id);
    }
    Ok(report)
}
