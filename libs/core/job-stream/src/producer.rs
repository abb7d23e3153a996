//! Stream producer for job enqueuing
//!
//! Any service (API handler, CLI, background task) can hold a writer to
//! queue jobs for the worker pool.
//!
//! # Example
//!
//! ```rust,ignore
//! use job_stream::{StreamTransport, StreamWriter, Writer};
//!
//! let transport = Arc::new(StreamTransport::connect(url, "notifications:email", 100_000).await?);
//! let writer = Writer::new(transport);
//! let id = writer.write_job("email", "email-consumer", "user-service", payload).await?;
//! ```

use crate::codec;
use crate::error::StreamError;
use crate::job::{DEFAULT_RETRY_LIMIT, Job};
use crate::message::Field;
use crate::registry::MessageKey;
use crate::transport::StreamTransport;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Append capability of a stream.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamWriter: Send + Sync {
    /// Append an entry with arbitrary fields.
    async fn write(&self, fields: &[Field]) -> Result<String, StreamError>;

    /// Append an already-built job using the canonical field layout.
    async fn enqueue(&self, job: &Job) -> Result<String, StreamError>;

    /// Build a job with a fresh job ID and append it.
    async fn write_job(
        &self,
        kind: &str,
        target: &str,
        source: &str,
        payload: &[u8],
    ) -> Result<String, StreamError>;

    /// Append a single-field entry.
    async fn write_json(&self, field: &str, payload: &[u8]) -> Result<String, StreamError>;
}

/// Writer role over a [`StreamTransport`].
#[derive(Debug, Clone)]
pub struct Writer {
    transport: Arc<StreamTransport>,
    retry_limit: i64,
}

impl Writer {
    pub fn new(transport: Arc<StreamTransport>) -> Self {
        Self {
            transport,
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }

    /// Set the retry limit stamped on every job written by `write_job`.
    pub fn with_retry_limit(mut self, retry_limit: i64) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn retry_limit(&self) -> i64 {
        self.retry_limit
    }

    pub fn stream_key(&self) -> &str {
        self.transport.key()
    }
}

#[async_trait]
impl StreamWriter for Writer {
    async fn write(&self, fields: &[Field]) -> Result<String, StreamError> {
        self.transport.append(fields).await
    }

    async fn enqueue(&self, job: &Job) -> Result<String, StreamError> {
        let id = self.transport.append(&codec::encode(job)).await?;

        debug!(
            stream = %self.transport.key(),
            message_id = %id,
            jid = %job.jid,
            kind = %job.kind,
            "Enqueued job"
        );

        Ok(id)
    }

    async fn write_job(
        &self,
        kind: &str,
        target: &str,
        source: &str,
        payload: &[u8],
    ) -> Result<String, StreamError> {
        let job = Job::new(kind, target, source, payload).with_retry_limit(self.retry_limit);
        self.enqueue(&job).await
    }

    async fn write_json(&self, field: &str, payload: &[u8]) -> Result<String, StreamError> {
        let field = if field.is_empty() {
            MessageKey::Json.as_ref()
        } else {
            field
        };
        self.transport.append(&[Field::new(field, payload)]).await
    }
}
