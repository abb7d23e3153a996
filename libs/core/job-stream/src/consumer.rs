//! Stream consumer for group reads
//!
//! Handles reading entries through a consumer group, acknowledging them and
//! reclaiming entries left pending by stalled consumers.

use crate::config::ConsumerConfig;
use crate::error::StreamError;
use crate::info::{ClaimPage, PendingEntry};
use crate::message::Message;
use crate::transport::StreamTransport;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Read and acknowledge capability of a stream, scoped to one group member.
#[async_trait]
pub trait StreamReader: Send + Sync {
    fn group(&self) -> &str;

    fn consumer(&self) -> &str;

    /// Read up to `count` new entries, blocking up to the reader's block duration.
    async fn read_group(&self, count: usize) -> Result<Vec<Message>, StreamError>;

    /// Entries between two IDs, inclusive.
    async fn range(&self, start: &str, end: &str) -> Result<Vec<Message>, StreamError>;

    /// Every entry in the stream.
    async fn range_all(&self) -> Result<Vec<Message>, StreamError> {
        self.range("-", "+").await
    }

    /// Acknowledge entries; they stay in the stream.
    async fn ack(&self, ids: &[String]) -> Result<i64, StreamError>;

    /// Acknowledge and delete entries in one atomic step.
    async fn ack_delete(&self, ids: &[String]) -> Result<i64, StreamError>;

    /// Claim one page of entries idle for at least `min_idle`, starting at `cursor`.
    async fn claim_idle(
        &self,
        min_idle: Duration,
        cursor: &str,
        count: usize,
    ) -> Result<ClaimPage, StreamError>;

    /// Claim every entry idle for at least `min_idle`.
    async fn claim_all_idle(&self, min_idle: Duration) -> Result<Vec<Message>, StreamError> {
        let mut cursor = "0-0".to_string();
        let mut claimed = Vec::new();

        loop {
            let page = self.claim_idle(min_idle, &cursor, 100).await?;
            if !page.deleted_ids.is_empty() {
                warn!(
                    group = %self.group(),
                    count = page.deleted_ids.len(),
                    "Pending entries no longer exist in the stream"
                );
            }
            claimed.extend(page.messages);
            if page.next_cursor == "0-0" || page.next_cursor == cursor {
                break;
            }
            cursor = page.next_cursor;
        }

        Ok(claimed)
    }

    /// Entries delivered to this consumer and not yet acknowledged.
    async fn pending(&self) -> Result<Vec<Message>, StreamError>;

    /// Pending entries of the whole group between two IDs.
    async fn pending_entries(
        &self,
        start: &str,
        end: &str,
        count: usize,
    ) -> Result<Vec<PendingEntry>, StreamError>;
}

/// Reader role over a [`StreamTransport`].
#[derive(Debug, Clone)]
pub struct Reader {
    transport: Arc<StreamTransport>,
    group: String,
    consumer: String,
    block: Duration,
    count: usize,
}

impl Reader {
    pub fn new(
        transport: Arc<StreamTransport>,
        group: impl Into<String>,
        consumer: impl Into<String>,
        block: Duration,
        count: usize,
    ) -> Self {
        Self {
            transport,
            group: group.into(),
            consumer: consumer.into(),
            block,
            count: count.max(1),
        }
    }

    pub fn from_config(transport: Arc<StreamTransport>, config: &ConsumerConfig) -> Self {
        Self::new(
            transport,
            &config.consumer_group,
            &config.consumer_name,
            config.block,
            config.batch_size,
        )
    }

    pub fn block(&self) -> Duration {
        self.block
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

#[async_trait]
impl StreamReader for Reader {
    fn group(&self) -> &str {
        &self.group
    }

    fn consumer(&self) -> &str {
        &self.consumer
    }

    async fn read_group(&self, count: usize) -> Result<Vec<Message>, StreamError> {
        let messages = self
            .transport
            .group_read(&self.group, &self.consumer, count, self.block)
            .await?;

        if !messages.is_empty() {
            debug!(
                stream = %self.transport.key(),
                group = %self.group,
                consumer = %self.consumer,
                count = messages.len(),
                "Read entries"
            );
        }
        Ok(messages)
    }

    async fn range(&self, start: &str, end: &str) -> Result<Vec<Message>, StreamError> {
        self.transport.range(start, end, None).await
    }

    async fn ack(&self, ids: &[String]) -> Result<i64, StreamError> {
        self.transport.ack(&self.group, ids).await
    }

    async fn ack_delete(&self, ids: &[String]) -> Result<i64, StreamError> {
        self.transport.ack_delete(&self.group, ids).await
    }

    async fn claim_idle(
        &self,
        min_idle: Duration,
        cursor: &str,
        count: usize,
    ) -> Result<ClaimPage, StreamError> {
        let page = self
            .transport
            .claim_idle(&self.group, &self.consumer, min_idle, cursor, count)
            .await?;

        if !page.messages.is_empty() {
            warn!(
                stream = %self.transport.key(),
                group = %self.group,
                consumer = %self.consumer,
                count = page.messages.len(),
                "Claimed idle entries"
            );
        }
        Ok(page)
    }

    async fn pending(&self) -> Result<Vec<Message>, StreamError> {
        self.transport
            .read_pending(&self.group, &self.consumer, self.count)
            .await
    }

    async fn pending_entries(
        &self,
        start: &str,
        end: &str,
        count: usize,
    ) -> Result<Vec<PendingEntry>, StreamError> {
        self.transport
            .pending_entries(&self.group, start, end, count)
            .await
    }
}
