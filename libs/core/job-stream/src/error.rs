//! Stream error types and error categorization
//!
//! Errors are categorized to decide what the worker pool does next:
//! - **Transient**: temporary failure, retry (poll loop backs off, jobs are redelivered)
//! - **Permanent**: retrying cannot help, dead-letter or surface to the caller

use std::time::Duration;
use thiserror::Error;

/// Category of error for determining retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Temporary failure - retry with exponential backoff
    Transient,
    /// Unrecoverable error - never retried
    Permanent,
}

impl ErrorCategory {
    /// Get the base delay in milliseconds for this error category
    pub fn base_delay_ms(&self) -> u64 {
        match self {
            ErrorCategory::Transient => 1000,
            ErrorCategory::Permanent => 0,
        }
    }

    /// Get the maximum delay in milliseconds for this error category
    pub fn max_delay_ms(&self) -> u64 {
        match self {
            ErrorCategory::Transient => 30_000,
            ErrorCategory::Permanent => 0,
        }
    }

    /// Calculate exponential backoff delay for the given number of consecutive failures
    pub fn backoff_delay_ms(&self, retry_count: u32) -> u64 {
        if *self == ErrorCategory::Permanent {
            return 0;
        }

        let base = self.base_delay_ms();
        let max = self.max_delay_ms();
        let delay = base.saturating_mul(2u64.saturating_pow(retry_count));
        delay.min(max)
    }
}

/// Errors raised while turning a stream entry into a [`Job`](crate::Job).
///
/// A decode error marks the entry as a poison message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Neither `payload` nor the `json` fallback field is present
    #[error("message is missing a payload")]
    MissingPayload,

    /// The `jid` field is absent
    #[error("message is missing job id")]
    MissingJobId,

    /// `retryLimit` is present but not an integer
    #[error("invalid retryLimit value {0:?}")]
    InvalidRetryLimit(String),

    /// A textual field holds bytes that are not UTF-8
    #[error("field {0:?} is not valid UTF-8")]
    InvalidField(String),

    /// The payload does not decode into the notifier's payload type
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Stream processing errors
#[derive(Error, Debug)]
pub enum StreamError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Entry could not be decoded into a job
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Serialization error for structured payloads
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Job processing (notifier) failed
    #[error("Processing error: {message}")]
    Processing {
        message: String,
        category: ErrorCategory,
    },

    /// Notifier did not finish within the configured send timeout
    #[error("Send timed out after {0:?}")]
    SendTimeout(Duration),

    /// Ack/delete called without any entry IDs
    #[error("at least one id is required")]
    NoIds,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Background submitter is no longer accepting jobs
    #[error("Submitter closed")]
    SubmitterClosed,
}

impl StreamError {
    /// Create a transient processing error
    pub fn transient(message: impl Into<String>) -> Self {
        StreamError::Processing {
            message: message.into(),
            category: ErrorCategory::Transient,
        }
    }

    /// Create a permanent processing error
    pub fn permanent(message: impl Into<String>) -> Self {
        StreamError::Processing {
            message: message.into(),
            category: ErrorCategory::Permanent,
        }
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            StreamError::Redis(e) => redis_category(e),
            StreamError::Decode(_) => ErrorCategory::Permanent,
            StreamError::Serialization(_) => ErrorCategory::Permanent,
            StreamError::Processing { category, .. } => *category,
            StreamError::SendTimeout(_) => ErrorCategory::Transient,
            StreamError::NoIds => ErrorCategory::Permanent,
            StreamError::Config(_) => ErrorCategory::Permanent,
            StreamError::SubmitterClosed => ErrorCategory::Permanent,
        }
    }

    /// The consumer group (or the stream) does not exist
    pub fn is_nogroup_error(&self) -> bool {
        matches!(self, StreamError::Redis(e) if e.code() == Some("NOGROUP"))
    }

    /// A client-side response timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, StreamError::Redis(e) if e.is_timeout())
    }

    /// Get the backoff delay for the given number of consecutive failures
    pub fn backoff_delay_ms(&self, retry_count: u32) -> u64 {
        self.category().backoff_delay_ms(retry_count)
    }
}

/// Server error replies are permanent unless the code signals a passing
/// server state. Client-side failures (IO, timeouts, parsing) carry no code
/// and stay transient.
fn redis_category(err: &redis::RedisError) -> ErrorCategory {
    match err.code() {
        Some(
            "NOGROUP" | "LOADING" | "BUSY" | "TRYAGAIN" | "MASTERDOWN" | "CLUSTERDOWN"
            | "READONLY" | "MOVED" | "ASK",
        ) => ErrorCategory::Transient,
        Some(_) => ErrorCategory::Permanent,
        None => ErrorCategory::Transient,
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Serialization(err.to_string())
    }
}
