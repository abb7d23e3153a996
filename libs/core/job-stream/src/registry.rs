//! Stream registry types and definitions.
//!
//! This module provides:
//! - `StreamDef` trait for domain-specific stream definitions
//! - `MessageKey` enum for the canonical job field names

use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Canonical field names of a job entry.
///
/// These are the names written by [`StreamWriter::write_job`](crate::StreamWriter::write_job)
/// and read back by [`codec::decode`](crate::codec::decode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Display, AsRefStr, EnumString, EnumIter)]
pub enum MessageKey {
    /// Producer-generated unique job ID.
    #[strum(serialize = "jid")]
    Jid,
    /// Routing hint describing the kind of work (e.g. "email").
    #[strum(serialize = "kind")]
    Kind,
    /// Routing hint naming the intended consumer.
    #[strum(serialize = "target")]
    Target,
    /// Routing hint naming the producer.
    #[strum(serialize = "source")]
    Source,
    /// Maximum delivery attempts, string-encoded integer.
    #[strum(serialize = "retryLimit")]
    RetryLimit,
    /// Opaque job payload.
    #[strum(serialize = "payload")]
    Payload,
    /// Alternate payload field used by single-field JSON entries.
    #[strum(serialize = "json")]
    Json,
}

impl MessageKey {
    /// The fields `write_job` emits, in wire order.
    pub fn job_fields() -> impl Iterator<Item = Self> {
        Self::iter().filter(|key| *key != MessageKey::Json)
    }
}

/// Stream definition trait.
///
/// Each domain implements this trait to define its stream configuration.
///
/// # Example
///
/// ```rust,ignore
/// use job_stream::StreamDef;
///
/// pub struct EmailStream;
///
/// impl StreamDef for EmailStream {
///     const STREAM_KEY: &'static str = "notifications:email";
///     const CONSUMER_GROUP: &'static str = "email-consumers";
///     const DLQ_STREAM: &'static str = "notifications:email:dlq";
/// }
/// ```
pub trait StreamDef: Send + Sync {
    /// The Redis stream key.
    const STREAM_KEY: &'static str;

    /// The consumer group name for this stream.
    const CONSUMER_GROUP: &'static str;

    /// The dead letter stream for jobs that exhausted their retries.
    const DLQ_STREAM: &'static str;

    /// Approximate maximum stream length (MAXLEN ~).
    /// Default: 100,000 entries.
    const MAX_LENGTH: i64 = 100_000;

    /// Get the stream key.
    fn stream_key() -> &'static str {
        Self::STREAM_KEY
    }

    /// Get the consumer group name.
    fn consumer_group() -> &'static str {
        Self::CONSUMER_GROUP
    }

    /// Get the DLQ stream name.
    fn dlq_stream() -> &'static str {
        Self::DLQ_STREAM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_key_names() {
        assert_eq!(MessageKey::Jid.to_string(), "jid");
        assert_eq!(MessageKey::RetryLimit.as_ref(), "retryLimit");
        assert_eq!(MessageKey::Json.as_ref(), "json");
    }

    #[test]
    fn test_message_key_parse() {
        let key: MessageKey = "retryLimit".parse().unwrap();
        assert_eq!(key, MessageKey::RetryLimit);
        assert!("retry_limit".parse::<MessageKey>().is_err());
    }

    #[test]
    fn test_job_fields_order() {
        let names: Vec<String> = MessageKey::job_fields().map(|k| k.to_string()).collect();
        assert_eq!(
            names,
            vec!["jid", "kind", "target", "source", "retryLimit", "payload"]
        );
    }

    struct TestStream;
    impl StreamDef for TestStream {
        const STREAM_KEY: &'static str = "test:stream";
        const CONSUMER_GROUP: &'static str = "test_workers";
        const DLQ_STREAM: &'static str = "test:dlq";
    }

    #[test]
    fn test_stream_def() {
        assert_eq!(TestStream::stream_key(), "test:stream");
        assert_eq!(TestStream::consumer_group(), "test_workers");
        assert_eq!(TestStream::dlq_stream(), "test:dlq");
        assert_eq!(TestStream::MAX_LENGTH, 100_000);
    }
}
