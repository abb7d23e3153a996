//! Stream administration: group lifecycle, trimming and introspection.

use crate::config::ConsumerConfig;
use crate::error::StreamError;
use crate::info::{ConsumerInfo, GroupInfo, PendingInfo, StreamInfo};
use crate::transport::StreamTransport;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Administrative capability of a stream, scoped to one group.
#[async_trait]
pub trait StreamAdmin: Send + Sync {
    /// Create the group (and the stream). An existing group is not an error.
    async fn create_group(&self) -> Result<(), StreamError>;

    async fn destroy_group(&self) -> Result<bool, StreamError>;

    /// Remove a consumer from the group; returns its pending entry count.
    async fn delete_consumer(&self, consumer: &str) -> Result<i64, StreamError>;

    async fn delete_stream(&self) -> Result<bool, StreamError>;

    /// Trim to about the configured maximum length; returns entries removed.
    async fn trim_approx(&self) -> Result<i64, StreamError>;

    async fn len(&self) -> Result<i64, StreamError>;

    async fn stream_info(&self) -> Result<StreamInfo, StreamError>;

    async fn group_info(&self) -> Result<Vec<GroupInfo>, StreamError>;

    async fn consumer_info(&self) -> Result<Vec<ConsumerInfo>, StreamError>;

    async fn pending_info(&self) -> Result<PendingInfo, StreamError>;
}

/// Admin role over a [`StreamTransport`].
#[derive(Debug, Clone)]
pub struct Admin {
    transport: Arc<StreamTransport>,
    group: String,
    start_id: String,
}

impl Admin {
    pub fn new(transport: Arc<StreamTransport>, group: impl Into<String>) -> Self {
        Self {
            transport,
            group: group.into(),
            start_id: "0".to_string(),
        }
    }

    pub fn from_config(transport: Arc<StreamTransport>, config: &ConsumerConfig) -> Self {
        Self::new(transport, &config.consumer_group).with_start_id(&config.group_start_id)
    }

    /// ID the group starts from when created ("0" = whole stream, "$" = new entries only)
    pub fn with_start_id(mut self, start_id: impl Into<String>) -> Self {
        self.start_id = start_id.into();
        self
    }
}

#[async_trait]
impl StreamAdmin for Admin {
    async fn create_group(&self) -> Result<(), StreamError> {
        self.transport.create_group(&self.group, &self.start_id).await
    }

    async fn destroy_group(&self) -> Result<bool, StreamError> {
        let destroyed = self.transport.destroy_group(&self.group).await?;
        info!(stream = %self.transport.key(), group = %self.group, destroyed, "Destroyed consumer group");
        Ok(destroyed)
    }

    async fn delete_consumer(&self, consumer: &str) -> Result<i64, StreamError> {
        let pending = self.transport.delete_consumer(&self.group, consumer).await?;
        info!(group = %self.group, consumer, pending, "Deleted consumer");
        Ok(pending)
    }

    async fn delete_stream(&self) -> Result<bool, StreamError> {
        let deleted = self.transport.delete_stream().await?;
        info!(stream = %self.transport.key(), deleted, "Deleted stream");
        Ok(deleted)
    }

    async fn trim_approx(&self) -> Result<i64, StreamError> {
        self.transport.trim_approx().await
    }

    async fn len(&self) -> Result<i64, StreamError> {
        self.transport.len().await
    }

    async fn stream_info(&self) -> Result<StreamInfo, StreamError> {
        self.transport.stream_info().await
    }

    async fn group_info(&self) -> Result<Vec<GroupInfo>, StreamError> {
        self.transport.group_info().await
    }

    async fn consumer_info(&self) -> Result<Vec<ConsumerInfo>, StreamError> {
        self.transport.consumer_info(&self.group).await
    }

    async fn pending_info(&self) -> Result<PendingInfo, StreamError> {
        self.transport.pending_summary(&self.group).await
    }
}
