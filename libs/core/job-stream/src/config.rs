//! Consumer configuration
//!
//! `ConsumerConfig` carries everything the reader, the admin and the worker
//! pool need. It is built explicitly (builder methods), from a [`StreamDef`],
//! or from the environment when the `config` feature is enabled.

use crate::registry::StreamDef;
use std::time::Duration;
use uuid::Uuid;

/// Configuration for a stream consumer and its worker pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Redis stream key
    pub stream_key: String,

    /// Consumer group name
    pub consumer_group: String,

    /// Consumer name within the group (auto-generated if not provided)
    pub consumer_name: String,

    /// Where the group starts reading when it is created ("0" = whole stream, "$" = new only)
    pub group_start_id: String,

    /// Dead letter stream for jobs that exhausted their retries
    pub dlq_stream: Option<String>,

    /// Approximate maximum stream length (0 disables trimming)
    pub max_length: usize,

    /// Maximum entries per group read
    pub batch_size: usize,

    /// How long a group read blocks waiting for new entries
    pub block: Duration,

    /// Worker pool size, also the job channel capacity
    pub max_workers: usize,

    /// Delivery attempts before a job is dead-lettered, when the job carries no retry limit
    pub retries: u32,

    /// Upper bound on a single notifier call (None = unbounded)
    pub send_timeout: Option<Duration>,

    /// Pending entries idle at least this long are claimed by this consumer
    pub min_idle: Duration,

    /// How often idle entries are claimed
    pub claim_interval: Duration,

    /// Acknowledge failed sends instead of leaving them pending
    pub ack_on_failure: bool,

    /// Delete entries from the stream once acknowledged
    pub delete_on_ack: bool,
}

impl ConsumerConfig {
    /// Create a new ConsumerConfig with explicit stream and group names
    pub fn new(stream_key: impl Into<String>, consumer_group: impl Into<String>) -> Self {
        Self {
            stream_key: stream_key.into(),
            consumer_group: consumer_group.into(),
            consumer_name: default_consumer_name(),
            group_start_id: "0".to_string(),
            dlq_stream: None,
            max_length: 100_000,
            batch_size: 10,
            block: Duration::from_secs(2),
            max_workers: 4,
            retries: 3,
            send_timeout: Some(Duration::from_secs(30)),
            min_idle: Duration::from_secs(90),
            claim_interval: Duration::from_secs(30),
            ack_on_failure: false,
            delete_on_ack: true,
        }
    }

    /// Create a new ConsumerConfig from a StreamDef
    pub fn from_stream_def<S: StreamDef>() -> Self {
        Self::new(S::stream_key(), S::consumer_group())
            .with_dlq_stream(S::dlq_stream())
            .with_max_length(usize::try_from(S::MAX_LENGTH).unwrap_or(0))
    }

    /// Set the consumer name
    pub fn with_consumer_name(mut self, name: impl Into<String>) -> Self {
        self.consumer_name = name.into();
        self
    }

    /// Set the ID the group starts from when created
    pub fn with_group_start_id(mut self, id: impl Into<String>) -> Self {
        self.group_start_id = id.into();
        self
    }

    /// Set the dead letter stream
    pub fn with_dlq_stream(mut self, stream: impl Into<String>) -> Self {
        self.dlq_stream = Some(stream.into());
        self
    }

    /// Disable dead-lettering
    pub fn without_dlq(mut self) -> Self {
        self.dlq_stream = None;
        self
    }

    /// Set the maximum stream length
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the group read block duration
    pub fn with_block(mut self, block: Duration) -> Self {
        self.block = block;
        self
    }

    /// Set the worker pool size
    pub fn with_max_workers(mut self, count: usize) -> Self {
        self.max_workers = count.max(1);
        self
    }

    /// Set the default retry limit
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the per-send timeout (None for unbounded)
    pub fn with_send_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the idle threshold for claiming stale entries
    pub fn with_min_idle(mut self, min_idle: Duration) -> Self {
        self.min_idle = min_idle;
        self
    }

    /// Set how often idle entries are claimed
    pub fn with_claim_interval(mut self, interval: Duration) -> Self {
        self.claim_interval = interval;
        self
    }

    /// Acknowledge failed sends (at-most-once)
    pub fn with_ack_on_failure(mut self, ack: bool) -> Self {
        self.ack_on_failure = ack;
        self
    }

    /// Delete acknowledged entries
    pub fn with_delete_on_ack(mut self, delete: bool) -> Self {
        self.delete_on_ack = delete;
        self
    }

    /// Whether an entry still queued or sending here can outlive `min_idle`.
    ///
    /// A queued entry waits behind at most one send per worker, so it stays
    /// with this consumer for up to two send timeouts.
    pub fn claim_overlaps_sends(&self) -> bool {
        match self.send_timeout {
            Some(limit) => self.min_idle <= limit.saturating_mul(2),
            None => true,
        }
    }

    /// Override fields from `STREAM_*` and `WORKER_*` environment variables.
    #[cfg(feature = "config")]
    pub fn with_env_overrides(mut self) -> Result<Self, core_config::ConfigError> {
        use core_config::{env_or_default, env_parse};

        self.stream_key = env_or_default("STREAM_KEY", &self.stream_key);
        self.consumer_group = env_or_default("STREAM_GROUP", &self.consumer_group);
        self.consumer_name = env_or_default("STREAM_CONSUMER", &self.consumer_name);
        if let Ok(dlq) = std::env::var("STREAM_DLQ") {
            self.dlq_stream = (!dlq.is_empty()).then_some(dlq);
        }
        self.max_length = env_parse("STREAM_MAX_LEN", self.max_length)?;
        self.batch_size = env_parse("STREAM_BATCH_SIZE", self.batch_size)?.max(1);
        self.block = millis("STREAM_BLOCK_MS", self.block)?;

        self.max_workers = env_parse("WORKER_MAX_WORKERS", self.max_workers)?.max(1);
        self.retries = env_parse("WORKER_RETRIES", self.retries)?;
        let send_timeout_ms = env_parse(
            "WORKER_SEND_TIMEOUT_MS",
            self.send_timeout.map_or(0, |t| t.as_millis() as u64),
        )?;
        self.send_timeout = (send_timeout_ms > 0).then(|| Duration::from_millis(send_timeout_ms));
        self.min_idle = millis("WORKER_MIN_IDLE_MS", self.min_idle)?;
        self.claim_interval = millis("WORKER_CLAIM_INTERVAL_MS", self.claim_interval)?;
        self.ack_on_failure = env_parse("WORKER_ACK_ON_FAILURE", self.ack_on_failure)?;
        self.delete_on_ack = env_parse("WORKER_DELETE_ON_ACK", self.delete_on_ack)?;

        Ok(self)
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self::new("stream:jobs", "workers")
    }
}

#[cfg(feature = "config")]
impl core_config::FromEnv for ConsumerConfig {
    fn from_env() -> Result<Self, core_config::ConfigError> {
        Self::default().with_env_overrides()
    }
}

#[cfg(feature = "config")]
fn millis(key: &str, default: Duration) -> Result<Duration, core_config::ConfigError> {
    core_config::env_parse(key, default.as_millis() as u64).map(Duration::from_millis)
}

fn default_consumer_name() -> String {
    format!("consumer-{}", Uuid::new_v4())
}
