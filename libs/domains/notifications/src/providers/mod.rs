//! Email provider implementations.
//!
//! This module contains the `EmailProvider` trait and the providers that
//! ship with the domain.

mod log;

pub use log::LogEmailProvider;

use crate::error::NotificationResult;
use crate::models::EmailJob;
use async_trait::async_trait;

/// Represents a sent email with provider-specific message ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    /// Provider-specific message ID for tracking.
    pub message_id: Option<String>,
    /// Whether the email was accepted for delivery.
    pub accepted: bool,
}

/// Trait for email sending providers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailProvider: Send + Sync + 'static {
    /// Send an email.
    async fn send(&self, email: &EmailJob) -> NotificationResult<SentEmail>;

    /// Get the provider name for logging.
    fn name(&self) -> &'static str;
}
