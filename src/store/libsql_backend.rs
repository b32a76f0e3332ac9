//! libSQL backend — async `MessageStore` implementation.
//!
//! Supports local file and in-memory databases. The message body lives in
//! the `snippet` column, which predates full-body storage.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::mail::types::Message;
use crate::store::migrations;
use crate::store::traits::{MessageStore, MessageUpdate};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

const MESSAGE_COLUMNS: &str = "id, sender, recipient, subject, date, snippet, is_read, labels";

/// Map a libsql Row to a Message.
fn row_to_message(row: &libsql::Row) -> Result<Message, DatabaseError> {
    let id: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("Failed to read message id: {e}")))?;
    let is_read: i64 = row.get(6).unwrap_or(0);
    let labels_json: String = row.get(7).unwrap_or_else(|_| "[]".to_string());
    let labels: Vec<String> = serde_json::from_str(&labels_json).map_err(|e| {
        DatabaseError::Serialization(format!("Invalid labels for message {id}: {e}"))
    })?;

    Ok(Message {
        sender: row.get(1).unwrap_or_default(),
        recipient: row.get(2).ok(),
        subject: row.get(3).unwrap_or_default(),
        date: row.get(4).unwrap_or_default(),
        body: row.get(5).ok(),
        is_read: is_read != 0,
        labels,
        id,
    })
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn labels_to_json(labels: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(labels)
        .map_err(|e| DatabaseError::Serialization(format!("Failed to encode labels: {e}")))
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl MessageStore for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn get_all(&self) -> Result<Vec<Message>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM emails ORDER BY rowid"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_all: {e}")))?;

        let mut messages = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_all: {e}")))?
        {
            messages.push(row_to_message(&row)?);
        }
        Ok(messages)
    }

    async fn get(&self, id: &str) -> Result<Option<Message>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM emails WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_message(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get: {e}"))),
        }
    }

    async fn upsert(&self, messages: &[Message]) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        for message in messages {
            conn.execute(
                "INSERT INTO emails (id, sender, recipient, subject, date, snippet,
                    is_read, labels, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                    sender = excluded.sender,
                    recipient = excluded.recipient,
                    subject = excluded.subject,
                    date = excluded.date,
                    snippet = excluded.snippet,
                    is_read = excluded.is_read,
                    labels = excluded.labels,
                    updated_at = excluded.updated_at",
                params![
                    message.id.as_str(),
                    message.sender.as_str(),
                    opt_text(message.recipient.as_deref()),
                    message.subject.as_str(),
                    message.date.as_str(),
                    opt_text(message.body.as_deref()),
                    message.is_read as i64,
                    labels_to_json(&message.labels)?,
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert {}: {e}", message.id)))?;
        }

        debug!(count = messages.len(), "Upserted messages");
        Ok(())
    }

    async fn update_fields(&self, id: &str, update: &MessageUpdate) -> Result<(), DatabaseError> {
        let not_found = || DatabaseError::NotFound {
            entity: "message".to_string(),
            id: id.to_string(),
        };

        if update.is_empty() {
            return match self.get(id).await? {
                Some(_) => Ok(()),
                None => Err(not_found()),
            };
        }

        let mut assignments = vec!["updated_at = ?1".to_string()];
        let mut values = vec![libsql::Value::Text(Utc::now().to_rfc3339())];
        if let Some(read) = update.is_read {
            values.push(libsql::Value::Integer(read as i64));
            assignments.push(format!("is_read = ?{}", values.len()));
        }
        if let Some(labels) = &update.labels {
            values.push(libsql::Value::Text(labels_to_json(labels)?));
            assignments.push(format!("labels = ?{}", values.len()));
        }
        values.push(libsql::Value::Text(id.to_string()));
        let sql = format!(
            "UPDATE emails SET {} WHERE id = ?{}",
            assignments.join(", "),
            values.len()
        );

        let count = self
            .conn()
            .execute(&sql, libsql::params::Params::Positional(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("update_fields {id}: {e}")))?;

        if count == 0 {
            return Err(not_found());
        }
        Ok(())
    }
}
