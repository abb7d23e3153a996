//! Job Stream
//!
//! A reliable job queue over Redis Streams.
//!
//! ## Features
//!
//! - **Capability roles**: `StreamWriter`, `StreamReader` and `StreamAdmin` over one shared `StreamTransport`
//! - **Job codec**: canonical `jid`/`kind`/`target`/`source`/`retryLimit`/`payload` fields
//! - **Worker pool**: bounded `WorkerPool<N: Notifier>` with backpressure and at-least-once delivery
//! - **Crash recovery**: idle entries are claimed from stalled consumers
//! - **Dead letter stream**: jobs that exhaust their retries are parked for inspection
//! - **Background submission**: `JobSubmitter` with per-job tickets and a joined shutdown
//! - **Prometheus metrics**: built-in observability
//!
//! ## Example
//!
//! ```ignore
//! use job_stream::{ConsumerConfig, StreamDef, StreamTransport, WorkerPool};
//!
//! struct EmailStream;
//! impl StreamDef for EmailStream {
//!     const STREAM_KEY: &'static str = "notifications:email";
//!     const CONSUMER_GROUP: &'static str = "email-consumers";
//!     const DLQ_STREAM: &'static str = "notifications:email:dlq";
//! }
//!
//! let config = ConsumerConfig::from_stream_def::<EmailStream>();
//! let transport = Arc::new(StreamTransport::connect(url, &config.stream_key, config.max_length).await?);
//! let pool = WorkerPool::from_transport(transport, EmailNotifier::new(provider), config);
//! let stats = pool.run(shutdown_rx).await?;
//! ```

mod admin;
mod background;
pub mod codec;
mod config;
mod consumer;
mod dlq;
mod error;
mod info;
mod job;
mod master;
mod message;
pub mod metrics;
mod notifier;
mod producer;
mod registry;
mod transport;
mod worker;

// Re-export main types
pub use admin::{Admin, StreamAdmin};
pub use background::{JobSubmitter, JobTicket, SubmitterHandle, SubmitterStats};
pub use config::ConsumerConfig;
pub use consumer::{Reader, StreamReader};
pub use dlq::{DeadLetterQueue, DeadLetterSink, DlqEntry, DlqStats};
pub use error::{DecodeError, ErrorCategory, StreamError};
pub use info::{ClaimPage, ConsumerInfo, GroupInfo, PendingEntry, PendingInfo, StreamInfo};
pub use job::{DEFAULT_RETRY_LIMIT, Disposition, FailureKind, Job, JobResult, new_jid};
pub use master::Master;
pub use message::{Field, Message};
pub use metrics::{StreamMetrics, init_metrics, render_metrics};
pub use notifier::Notifier;
pub use producer::{StreamWriter, Writer};
pub use registry::{MessageKey, StreamDef};
pub use transport::StreamTransport;
pub use worker::{PoolStats, WorkerPool};
