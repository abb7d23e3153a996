//! Job records and processing results.

use crate::error::{DecodeError, ErrorCategory, StreamError};
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

/// Retry limit written by producers unless configured otherwise.
pub const DEFAULT_RETRY_LIMIT: i64 = 3;

/// A unit of deferred work carried by one stream entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Job {
    /// Stream entry ID (empty until the job has been read back from the stream)
    pub message_id: String,
    /// Producer-generated unique job ID
    pub jid: String,
    /// Routing hint: kind of work
    pub kind: String,
    /// Routing hint: intended consumer
    pub target: String,
    /// Routing hint: producer
    pub source: String,
    /// Maximum delivery attempts; 0 means "use the consumer default"
    pub retry_limit: i64,
    /// Opaque payload bytes
    pub payload: Vec<u8>,
}

impl Job {
    /// Create a job with a fresh job ID.
    pub fn new(
        kind: impl Into<String>,
        target: impl Into<String>,
        source: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            message_id: String::new(),
            jid: new_jid(),
            kind: kind.into(),
            target: target.into(),
            source: source.into(),
            retry_limit: DEFAULT_RETRY_LIMIT,
            payload: payload.into(),
        }
    }

    /// Set the retry limit
    pub fn with_retry_limit(mut self, retry_limit: i64) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Decode the payload as JSON into `T`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        serde_json::from_slice(&self.payload).map_err(|e| DecodeError::InvalidPayload(e.to_string()))
    }

    /// Retry limit to enforce, falling back to `default` when the job carries none.
    pub fn effective_retry_limit(&self, default: u32) -> u32 {
        if self.retry_limit > 0 {
            u32::try_from(self.retry_limit).unwrap_or(u32::MAX)
        } else {
            default
        }
    }
}

/// Generate a unique job ID.
pub fn new_jid() -> String {
    Uuid::new_v4().to_string()
}

/// What happened to the stream entry after processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledged and removed from the stream
    Deleted,
    /// Acknowledged, entry kept in the stream
    Acknowledged,
    /// Left in the pending entries list for redelivery
    Retained,
    /// Copied to the dead letter stream, then removed
    DeadLettered,
    /// Settling the entry failed; it stays pending
    Unsettled,
}

/// Classification of a failed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The entry could not be decoded (poison message)
    Decode,
    /// The notifier returned an error or timed out
    Send,
    /// Acknowledging or deleting the entry failed
    Ack,
}

/// Outcome of processing one message.
#[derive(Debug, Clone)]
pub struct JobResult {
    /// Job ID, empty when the message could not be decoded
    pub jid: String,
    /// Stream entry ID
    pub msg_id: String,
    pub success: bool,
    /// Error description for failed results
    pub error: Option<String>,
    pub error_kind: Option<FailureKind>,
    pub retry_limit: u32,
    /// Delivery attempts so far, including this one
    pub attempts: u32,
    pub duration: Duration,
    pub disposition: Disposition,
}

impl JobResult {
    /// A successful result
    pub fn succeeded(job: &Job, attempts: u32, retry_limit: u32, duration: Duration, disposition: Disposition) -> Self {
        Self {
            jid: job.jid.clone(),
            msg_id: job.message_id.clone(),
            success: true,
            error: None,
            error_kind: None,
            retry_limit,
            attempts,
            duration,
            disposition,
        }
    }

    /// A failed result
    pub fn failed(
        msg_id: impl Into<String>,
        jid: impl Into<String>,
        failure: FailureKind,
        error: &StreamError,
        disposition: Disposition,
    ) -> Self {
        Self {
            jid: jid.into(),
            msg_id: msg_id.into(),
            success: false,
            error: Some(error.to_string()),
            error_kind: Some(failure),
            retry_limit: 0,
            attempts: 0,
            duration: Duration::ZERO,
            disposition,
        }
    }

    /// Record attempts and the retry limit on a result
    pub fn with_attempts(mut self, attempts: u32, retry_limit: u32) -> Self {
        self.attempts = attempts;
        self.retry_limit = retry_limit;
        self
    }

    /// Record how long processing took
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Whether a failed delivery is left pending for another attempt.
pub(crate) fn should_retry(attempts: u32, retry_limit: u32, category: ErrorCategory) -> bool {
    category == ErrorCategory::Transient && attempts < retry_limit
}
