//! Stream definitions for the notifications domain.

use job_stream::StreamDef;

/// Email jobs stream definition.
///
/// Used by the email-worker to process background email jobs.
pub struct EmailStream;

impl StreamDef for EmailStream {
    const STREAM_KEY: &'static str = "notifications:email";

    const CONSUMER_GROUP: &'static str = "email-consumers";

    const DLQ_STREAM: &'static str = "notifications:email:dlq";

    /// Maximum stream length (100k entries).
    const MAX_LENGTH: i64 = 100_000;
}

#[cfg(test)]
mod tests {
    use super::*;
    use job_stream::ConsumerConfig;

    #[test]
    fn test_email_stream_def() {
        assert_eq!(EmailStream::stream_key(), "notifications:email");
        assert_eq!(EmailStream::consumer_group(), "email-consumers");
        assert_eq!(EmailStream::dlq_stream(), "notifications:email:dlq");
        assert_eq!(EmailStream::MAX_LENGTH, 100_000);
    }

    #[test]
    fn test_consumer_config_from_stream() {
        let config = ConsumerConfig::from_stream_def::<EmailStream>();
        assert_eq!(config.stream_key, "notifications:email");
        assert_eq!(config.dlq_stream.as_deref(), Some("notifications:email:dlq"));
        assert_eq!(config.max_length, 100_000);
    }
}
