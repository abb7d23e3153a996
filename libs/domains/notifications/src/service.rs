//! Notification service for queueing email jobs.

use crate::config::EmailConfig;
use crate::error::NotificationResult;
use crate::models::EmailJob;
use job_stream::{Job, JobSubmitter, JobTicket};
use tracing::debug;

/// Job kind of email notifications.
pub const EMAIL_KIND: &str = "email";
/// Consumer the jobs are addressed to.
pub const EMAIL_TARGET: &str = "email-consumer";
/// Producer recorded on signup emails.
pub const USER_SERVICE_SOURCE: &str = "user-service";

/// Service for queueing email notifications.
///
/// Jobs go through a [`JobSubmitter`], so callers never wait on Redis; the
/// returned ticket resolves once the job is in the stream.
#[derive(Clone)]
pub struct NotificationService {
    submitter: JobSubmitter,
    config: EmailConfig,
}

impl NotificationService {
    pub fn new(submitter: JobSubmitter, config: EmailConfig) -> Self {
        Self { submitter, config }
    }

    pub fn config(&self) -> &EmailConfig {
        &self.config
    }

    /// Queue the welcome email for a new signup.
    pub async fn queue_welcome_email(&self, email: &str, name: &str) -> NotificationResult<JobTicket> {
        let job = EmailJob::welcome(&self.config, email, name);
        self.queue_email(&job, USER_SERVICE_SOURCE).await
    }

    /// Queue any email job on behalf of `source`.
    pub async fn queue_email(&self, email: &EmailJob, source: &str) -> NotificationResult<JobTicket> {
        email.validate()?;

        let job = Job::new(EMAIL_KIND, EMAIL_TARGET, source, email.to_payload()?);
        let ticket = self.submitter.submit(job).await?;

        debug!(
            jid = %ticket.jid(),
            template = %email.template,
            recipients = email.to.len(),
            source,
            "Queued email job"
        );
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotificationError;
    use async_trait::async_trait;
    use job_stream::{Field, StreamError, StreamWriter, codec};
    use std::sync::{Arc, Mutex};

    /// Writer that keeps every job it is handed.
    #[derive(Default)]
    struct RecordingWriter {
        jobs: Mutex<Vec<Job>>,
    }

    #[async_trait]
    impl StreamWriter for RecordingWriter {
        async fn write(&self, _fields: &[Field]) -> Result<String, StreamError> {
            Err(StreamError::permanent("unexpected raw write"))
        }

        async fn enqueue(&self, job: &Job) -> Result<String, StreamError> {
            let mut jobs = self.jobs.lock().unwrap();
            jobs.push(job.clone());
            Ok(format!("{}-0", jobs.len()))
        }

        async fn write_job(
            &self,
            _kind: &str,
            _target: &str,
            _source: &str,
            _payload: &[u8],
        ) -> Result<String, StreamError> {
            Err(StreamError::permanent("unexpected write_job"))
        }

        async fn write_json(&self, _field: &str, _payload: &[u8]) -> Result<String, StreamError> {
            Err(StreamError::permanent("unexpected write_json"))
        }
    }

    #[tokio::test]
    async fn test_queue_welcome_email() {
        let writer = Arc::new(RecordingWriter::default());
        let (submitter, handle) = JobSubmitter::spawn(writer.clone(), 8);
        let service = NotificationService::new(submitter, EmailConfig::default());

        let ticket = service
            .queue_welcome_email("ada@example.com", "Ada")
            .await
            .unwrap();
        assert_eq!(ticket.wait().await.unwrap(), "1-0");
        handle.shutdown().await;

        let jobs = writer.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.kind, "email");
        assert_eq!(job.target, "email-consumer");
        assert_eq!(job.source, "user-service");

        // The payload survives the wire layout the worker decodes
        let msg = job_stream::Message::new("1-0", codec::encode(job));
        let decoded = codec::decode(&msg).unwrap();
        let email: EmailJob = decoded.decode_payload().unwrap();
        assert_eq!(email.to, vec!["ada@example.com"]);
        assert_eq!(email.template, "welcome");
        assert_eq!(email.data["name"], "Ada");
    }

    #[tokio::test]
    async fn test_invalid_address_is_not_queued() {
        let writer = Arc::new(RecordingWriter::default());
        let (submitter, handle) = JobSubmitter::spawn(writer.clone(), 8);
        let service = NotificationService::new(submitter, EmailConfig::default());

        let result = service.queue_welcome_email("ada", "Ada").await;
        assert!(matches!(result, Err(NotificationError::InvalidEmail(_))));

        assert_eq!(handle.shutdown().await.written, 0);
        assert!(writer.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_submitter_is_queue_error() {
        let writer = Arc::new(RecordingWriter::default());
        let (submitter, handle) = JobSubmitter::spawn(writer, 8);
        handle.shutdown().await;

        let service = NotificationService::new(submitter, EmailConfig::default());
        let result = service.queue_welcome_email("ada@example.com", "Ada").await;
        assert!(matches!(
            result,
            Err(NotificationError::QueueError(StreamError::SubmitterClosed))
        ));
    }
}
