//! Notifications Domain
//!
//! Email notifications delivered through the job stream.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  User Service   │  ← Signs users up
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │ NotificationSvc │  ← Builds EmailJob payloads, submits jobs
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │   Redis Stream  │  ← notifications:email
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │  Email Worker   │  ← WorkerPool<EmailNotifier<P>>
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │ Email Provider  │  ← LogEmailProvider, or a real delivery service
//! └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_notifications::{EmailConfig, NotificationService};
//! use job_stream::JobSubmitter;
//!
//! let (submitter, handle) = JobSubmitter::spawn(writer, 256);
//! let service = NotificationService::new(submitter, EmailConfig::from_env()?);
//!
//! let ticket = service.queue_welcome_email("ada@example.com", "Ada").await?;
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod notifier;
pub mod providers;
pub mod service;
pub mod streams;

// Re-export commonly used types
pub use config::EmailConfig;
pub use error::{NotificationError, NotificationResult};
pub use models::EmailJob;
pub use notifier::EmailNotifier;
pub use providers::{EmailProvider, LogEmailProvider, SentEmail};
pub use service::NotificationService;
pub use streams::EmailStream;
