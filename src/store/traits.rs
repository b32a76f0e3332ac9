//! `MessageStore` trait — async interface for message persistence.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::mail::types::Message;

/// Partial update for a stored message. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageUpdate {
    pub is_read: Option<bool>,
    pub labels: Option<Vec<String>>,
}

impl MessageUpdate {
    pub fn read_state(read: bool) -> Self {
        Self {
            is_read: Some(read),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.is_read.is_none() && self.labels.is_none()
    }
}

/// Backend-agnostic message store.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Create or migrate the schema. Idempotent.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Every stored message, in first-insertion order.
    async fn get_all(&self) -> Result<Vec<Message>, DatabaseError>;

    /// A message by ID.
    async fn get(&self, id: &str) -> Result<Option<Message>, DatabaseError>;

    /// Insert or replace each message by ID. The last write wins.
    async fn upsert(&self, messages: &[Message]) -> Result<(), DatabaseError>;

    /// Apply a partial update. Fails with `NotFound` for an unknown ID.
    async fn update_fields(&self, id: &str, update: &MessageUpdate) -> Result<(), DatabaseError>;
}
