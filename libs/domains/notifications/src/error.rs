//! Error types for the notifications domain.

use job_stream::StreamError;
use thiserror::Error;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in the notifications domain.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Email provider error; the provider may recover.
    #[error("Email provider error: {0}")]
    ProviderError(String),

    /// The provider refused the message; resending will not help.
    #[error("Email rejected: {0}")]
    Rejected(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    /// Job payload could not be built or read.
    #[error("Invalid email job: {0}")]
    InvalidJob(String),

    /// Stream queue error.
    #[error("Queue error: {0}")]
    QueueError(#[from] StreamError),
}

impl NotificationError {
    /// Whether a retry can change the outcome.
    pub fn is_permanent(&self) -> bool {
        match self {
            NotificationError::ProviderError(_) => false,
            NotificationError::Rejected(_)
            | NotificationError::InvalidEmail(_)
            | NotificationError::InvalidJob(_) => true,
            NotificationError::QueueError(e) => {
                e.category() == job_stream::ErrorCategory::Permanent
            }
        }
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        NotificationError::InvalidJob(format!("JSON serialization error: {}", err))
    }
}

/// Convert NotificationError to StreamError so the worker pool can settle it.
impl From<NotificationError> for StreamError {
    fn from(e: NotificationError) -> Self {
        match e {
            NotificationError::QueueError(inner) => inner,
            other if other.is_permanent() => StreamError::permanent(other.to_string()),
            other => StreamError::transient(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use job_stream::ErrorCategory;

    #[test]
    fn test_provider_error_is_retried() {
        let err: StreamError = NotificationError::ProviderError("timeout".into()).into();
        assert_eq!(err.category(), ErrorCategory::Transient);
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_rejection_is_permanent() {
        let err: StreamError = NotificationError::InvalidEmail("nobody".into()).into();
        assert_eq!(err.category(), ErrorCategory::Permanent);
    }

    #[test]
    fn test_queue_error_passes_through() {
        let err: StreamError = NotificationError::QueueError(StreamError::SubmitterClosed).into();
        assert!(matches!(err, StreamError::SubmitterClosed));
    }
}
