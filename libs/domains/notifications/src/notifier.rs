//! Email delivery for the worker pool.

use crate::error::NotificationError;
use crate::models::EmailJob;
use crate::providers::EmailProvider;
use async_trait::async_trait;
use job_stream::{Job, Notifier, StreamError};
use std::sync::Arc;
use tracing::{info, warn};

/// Hands decoded [`EmailJob`]s to an [`EmailProvider`].
///
/// Invalid recipients and provider rejections are permanent failures, so the
/// pool dead-letters them instead of redelivering.
pub struct EmailNotifier<P: EmailProvider> {
    provider: Arc<P>,
}

impl<P: EmailProvider> EmailNotifier<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }

    pub fn with_arc(provider: Arc<P>) -> Self {
        Self { provider }
    }

    /// Get a reference to the email provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: EmailProvider> Clone for EmailNotifier<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
        }
    }
}

#[async_trait]
impl<P: EmailProvider> Notifier for EmailNotifier<P> {
    type Payload = EmailJob;

    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, job: &Job, email: EmailJob) -> Result<(), StreamError> {
        email.validate()?;

        let sent = self.provider.send(&email).await?;
        if !sent.accepted {
            warn!(jid = %job.jid, provider = self.provider.name(), "Provider rejected email");
            return Err(NotificationError::Rejected(format!(
                "{} did not accept the message",
                self.provider.name()
            ))
            .into());
        }

        info!(
            jid = %job.jid,
            provider = self.provider.name(),
            template = %email.template,
            recipients = email.to.len(),
            provider_message_id = ?sent.message_id,
            "Sent email"
        );
        Ok(())
    }
}
