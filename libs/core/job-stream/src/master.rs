//! A single handle holding every stream capability.

use crate::admin::{Admin, StreamAdmin};
use crate::config::ConsumerConfig;
use crate::consumer::{Reader, StreamReader};
use crate::error::StreamError;
use crate::info::{ClaimPage, ConsumerInfo, GroupInfo, PendingEntry, PendingInfo, StreamInfo};
use crate::job::Job;
use crate::message::{Field, Message};
use crate::producer::{StreamWriter, Writer};
use crate::transport::StreamTransport;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Writer, reader and admin over one shared transport.
///
/// Hand out `Arc<Master>` as `Arc<dyn StreamWriter>`, `Arc<dyn StreamReader>`
/// or `Arc<dyn StreamAdmin>` to give each collaborator only what it needs.
#[derive(Debug, Clone)]
pub struct Master {
    writer: Writer,
    reader: Reader,
    admin: Admin,
}

impl Master {
    pub fn new(transport: Arc<StreamTransport>, config: &ConsumerConfig) -> Self {
        Self {
            writer: Writer::new(transport.clone()),
            reader: Reader::from_config(transport.clone(), config),
            admin: Admin::from_config(transport, config),
        }
    }

    /// Set the retry limit stamped on jobs written by `write_job`.
    pub fn with_retry_limit(mut self, retry_limit: i64) -> Self {
        self.writer = self.writer.with_retry_limit(retry_limit);
        self
    }

    pub fn writer(&self) -> &Writer {
        &self.writer
    }

    pub fn reader(&self) -> &Reader {
        &self.reader
    }

    pub fn admin(&self) -> &Admin {
        &self.admin
    }
}

#[async_trait]
impl StreamWriter for Master {
    async fn write(&self, fields: &[Field]) -> Result<String, StreamError> {
        self.writer.write(fields).await
    }

    async fn enqueue(&self, job: &Job) -> Result<String, StreamError> {
        self.writer.enqueue(job).await
    }

    async fn write_job(
        &self,
        kind: &str,
        target: &str,
        source: &str,
        payload: &[u8],
    ) -> Result<String, StreamError> {
        self.writer.write_job(kind, target, source, payload).await
    }

    async fn write_json(&self, field: &str, payload: &[u8]) -> Result<String, StreamError> {
        self.writer.write_json(field, payload).await
    }
}

#[async_trait]
impl StreamReader for Master {
    fn group(&self) -> &str {
        self.reader.group()
    }

    fn consumer(&self) -> &str {
        self.reader.consumer()
    }

    async fn read_group(&self, count: usize) -> Result<Vec<Message>, StreamError> {
        self.reader.read_group(count).await
    }

    async fn range(&self, start: &str, end: &str) -> Result<Vec<Message>, StreamError> {
        self.reader.range(start, end).await
    }

    async fn ack(&self, ids: &[String]) -> Result<i64, StreamError> {
        self.reader.ack(ids).await
    }

    async fn ack_delete(&self, ids: &[String]) -> Result<i64, StreamError> {
        self.reader.ack_delete(ids).await
    }

    async fn claim_idle(
        &self,
        min_idle: Duration,
        cursor: &str,
        count: usize,
    ) -> Result<ClaimPage, StreamError> {
        self.reader.claim_idle(min_idle, cursor, count).await
    }

    async fn pending(&self) -> Result<Vec<Message>, StreamError> {
        self.reader.pending().await
    }

    async fn pending_entries(
        &self,
        start: &str,
        end: &str,
        count: usize,
    ) -> Result<Vec<PendingEntry>, StreamError> {
        self.reader.pending_entries(start, end, count).await
    }
}

#[async_trait]
impl StreamAdmin for Master {
    async fn create_group(&self) -> Result<(), StreamError> {
        self.admin.create_group().await
    }

    async fn destroy_group(&self) -> Result<bool, StreamError> {
        self.admin.destroy_group().await
    }

    async fn delete_consumer(&self, consumer: &str) -> Result<i64, StreamError> {
        self.admin.delete_consumer(consumer).await
    }

    async fn delete_stream(&self) -> Result<bool, StreamError> {
        self.admin.delete_stream().await
    }

    async fn trim_approx(&self) -> Result<i64, StreamError> {
        self.admin.trim_approx().await
    }

    async fn len(&self) -> Result<i64, StreamError> {
        self.admin.len().await
    }

    async fn stream_info(&self) -> Result<StreamInfo, StreamError> {
        self.admin.stream_info().await
    }

    async fn group_info(&self) -> Result<Vec<GroupInfo>, StreamError> {
        self.admin.group_info().await
    }

    async fn consumer_info(&self) -> Result<Vec<ConsumerInfo>, StreamError> {
        self.admin.consumer_info().await
    }

    async fn pending_info(&self) -> Result<PendingInfo, StreamError> {
        self.admin.pending_info().await
    }
}
