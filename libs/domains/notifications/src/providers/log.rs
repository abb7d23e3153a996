use super::{EmailProvider, SentEmail};
use crate::error::NotificationResult;
use crate::models::EmailJob;
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

/// Provider that only logs what it would send.
///
/// Used in development and wherever real delivery happens downstream.
#[derive(Debug, Clone, Default)]
pub struct LogEmailProvider;

#[async_trait]
impl EmailProvider for LogEmailProvider {
    async fn send(&self, email: &EmailJob) -> NotificationResult<SentEmail> {
        let message_id = Uuid::new_v4().to_string();

        info!(
            message_id = %message_id,
            to = ?email.to,
            from = %email.from,
            template = %email.template,
            template_version = %email.template_version,
            subject = %email.subject,
            data_keys = ?email.data.keys().collect::<Vec<_>>(),
            "Email delivered to log"
        );

        Ok(SentEmail {
            message_id: Some(message_id),
            accepted: true,
        })
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_provider_accepts() {
        let sent = LogEmailProvider
            .send(&EmailJob::new("a@example.com", "welcome"))
            .await
            .unwrap();
        assert!(sent.accepted);
        assert!(sent.message_id.is_some());
    }
}
