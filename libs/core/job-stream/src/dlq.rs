//! Dead letter stream
//!
//! Holds jobs that exhausted their retries or failed permanently. Each dead
//! letter keeps the original entry's fields verbatim and adds metadata
//! describing the failure, so it can be inspected or replayed.

use crate::error::StreamError;
use crate::message::{Field, Message};
use crate::transport::StreamTransport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Metadata field names added to every dead letter
pub const FIELD_ORIGINAL_ID: &str = "dlq_original_id";
pub const FIELD_ORIGINAL_STREAM: &str = "dlq_original_stream";
pub const FIELD_ERROR: &str = "dlq_error";
pub const FIELD_ATTEMPTS: &str = "dlq_attempts";
pub const FIELD_FAILED_AT: &str = "dlq_failed_at";

/// Destination for messages the worker pool gives up on.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Store a copy of `message`; returns the dead letter's ID.
    async fn dead_letter(
        &self,
        message: &Message,
        error: &str,
        attempts: u32,
    ) -> Result<String, StreamError>;
}

/// Dead letter stream manager
#[derive(Debug, Clone)]
pub struct DeadLetterQueue {
    transport: StreamTransport,
    source_stream: String,
}

impl DeadLetterQueue {
    /// Dead letter stream `dlq_key` for jobs from `source`, sharing its connections.
    pub fn new(source: &StreamTransport, dlq_key: impl Into<String>) -> Self {
        Self {
            transport: source.with_key(dlq_key, 10_000),
            source_stream: source.key().to_string(),
        }
    }

    /// Set the approximate maximum dead letter count
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.transport = self.transport.with_key(self.transport.key().to_string(), max_length);
        self
    }

    /// Get the dead letter stream key
    pub fn stream_key(&self) -> &str {
        self.transport.key()
    }

    /// Copy a message to the dead letter stream
    pub async fn move_message(
        &self,
        message: &Message,
        error: &str,
        attempts: u32,
    ) -> Result<String, StreamError> {
        let mut fields: Vec<Field> = message
            .fields
            .iter()
            .filter(|f| !f.name.starts_with("dlq_"))
            .cloned()
            .collect();
        fields.push(Field::new(FIELD_ORIGINAL_ID, message.id.as_bytes()));
        fields.push(Field::new(FIELD_ORIGINAL_STREAM, self.source_stream.as_bytes()));
        fields.push(Field::new(FIELD_ERROR, error.as_bytes()));
        fields.push(Field::new(FIELD_ATTEMPTS, attempts.to_string()));
        fields.push(Field::new(FIELD_FAILED_AT, Utc::now().to_rfc3339()));

        let dlq_id = self.transport.append(&fields).await?;

        info!(
            message_id = %message.id,
            dlq_id = %dlq_id,
            error = %error,
            attempts,
            "Moved message to dead letter stream"
        );

        Ok(dlq_id)
    }

    /// Get dead letter statistics
    pub async fn stats(&self) -> Result<DlqStats, StreamError> {
        let length = self.transport.len().await?;
        let oldest = self.transport.range("-", "+", Some(1)).await?;
        let info = if length > 0 {
            Some(self.transport.stream_info().await?)
        } else {
            None
        };

        Ok(DlqStats {
            stream_name: self.transport.key().to_string(),
            length,
            oldest_entry_id: oldest.first().map(|m| m.id.clone()),
            newest_entry_id: info.and_then(|i| i.last_entry_id),
        })
    }

    /// List up to `count` dead letters, starting at `offset` (inclusive)
    pub async fn list(&self, count: usize, offset: Option<&str>) -> Result<Vec<DlqEntry>, StreamError> {
        let start = offset.unwrap_or("-");
        let messages = self.transport.range(start, "+", Some(count)).await?;
        Ok(messages.iter().map(DlqEntry::from_message).collect())
    }

    /// Get a specific dead letter by ID
    pub async fn get(&self, dlq_id: &str) -> Result<Option<DlqEntry>, StreamError> {
        let messages = self.transport.range(dlq_id, dlq_id, Some(1)).await?;
        Ok(messages.first().map(DlqEntry::from_message))
    }

    /// Delete a dead letter
    pub async fn delete(&self, dlq_id: &str) -> Result<bool, StreamError> {
        let deleted = self.transport.delete(&[dlq_id.to_string()]).await?;
        debug!(dlq_id = %dlq_id, "Deleted dead letter");
        Ok(deleted > 0)
    }

    /// Remove every dead letter; returns how many there were
    pub async fn purge(&self) -> Result<i64, StreamError> {
        let len = self.transport.len().await?;
        if len > 0 {
            self.transport.delete_stream().await?;
            info!(stream = %self.transport.key(), count = len, "Purged dead letter stream");
        }
        Ok(len)
    }
}

#[async_trait]
impl DeadLetterSink for DeadLetterQueue {
    async fn dead_letter(
        &self,
        message: &Message,
        error: &str,
        attempts: u32,
    ) -> Result<String, StreamError> {
        self.move_message(message, error, attempts).await
    }
}

/// A dead letter read back from the stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    /// Dead letter stream entry ID
    pub dlq_id: String,

    /// Entry ID in the source stream
    pub original_id: String,

    pub original_stream: String,

    /// Error message that caused the failure
    pub error: String,

    /// Delivery attempts made before giving up
    pub attempts: u32,

    /// When the job was dead-lettered
    pub failed_at: Option<DateTime<Utc>>,

    /// The original entry's fields, metadata removed
    #[serde(skip)]
    pub fields: Vec<Field>,
}

impl DlqEntry {
    pub fn from_message(message: &Message) -> Self {
        let text = |name: &str| {
            message
                .field(name)
                .and_then(Field::value_str)
                .unwrap_or_default()
                .to_string()
        };

        Self {
            dlq_id: message.id.clone(),
            original_id: text(FIELD_ORIGINAL_ID),
            original_stream: text(FIELD_ORIGINAL_STREAM),
            error: text(FIELD_ERROR),
            attempts: text(FIELD_ATTEMPTS).parse().unwrap_or(0),
            failed_at: DateTime::parse_from_rfc3339(&text(FIELD_FAILED_AT))
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            fields: message
                .fields
                .iter()
                .filter(|f| !f.name.starts_with("dlq_"))
                .cloned()
                .collect(),
        }
    }

    /// Rebuild the original message, e.g. to decode or replay it
    pub fn original_message(&self) -> Message {
        Message::new(self.original_id.clone(), self.fields.clone())
    }
}

/// Dead letter statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqStats {
    pub stream_name: String,
    pub length: i64,
    pub oldest_entry_id: Option<String>,
    pub newest_entry_id: Option<String>,
}
