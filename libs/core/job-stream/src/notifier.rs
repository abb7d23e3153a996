//! The side-effect seam of the worker pool.

use crate::error::StreamError;
use crate::job::Job;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Performs the work a job describes (send an email, call a webhook, ...).
///
/// The worker pool decodes each job's payload into [`Notifier::Payload`]
/// before calling [`Notifier::send`]; a payload that does not decode is a
/// poison message and never reaches the notifier.
///
/// Return [`StreamError::permanent`] for failures a retry cannot fix so the
/// job is dead-lettered right away instead of being redelivered.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Typed payload carried by the jobs this notifier handles
    type Payload: DeserializeOwned + Send + 'static;

    /// Name used in logs and metric labels
    fn name(&self) -> &'static str;

    async fn send(&self, job: &Job, payload: Self::Payload) -> Result<(), StreamError>;
}
