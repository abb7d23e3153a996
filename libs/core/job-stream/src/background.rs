//! Supervised background job submission.
//!
//! Request handlers should not wait on Redis to enqueue side effects, but a
//! detached `tokio::spawn` per job loses errors and is never joined. A
//! [`JobSubmitter`] funnels jobs through a bounded channel to one writer
//! task; every submission gets a [`JobTicket`] that resolves to the entry ID
//! (or the write error), and [`SubmitterHandle::shutdown`] drains the queue
//! and reports what happened.

use crate::error::StreamError;
use crate::job::Job;
use crate::producer::StreamWriter;
use crate::worker::wait_for_shutdown;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type Reply = oneshot::Sender<Result<String, StreamError>>;

struct Submission {
    job: Job,
    reply: Reply,
}

/// Counters reported when the submitter shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitterStats {
    pub written: u64,
    pub failed: u64,
}

/// Cloneable handle for queueing jobs.
#[derive(Clone)]
pub struct JobSubmitter {
    tx: mpsc::Sender<Submission>,
}

/// Owner of the background writer task.
pub struct SubmitterHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<SubmitterStats>,
}

/// Completion of one submission.
#[derive(Debug)]
pub struct JobTicket {
    jid: String,
    rx: oneshot::Receiver<Result<String, StreamError>>,
}

impl JobTicket {
    pub fn jid(&self) -> &str {
        &self.jid
    }

    /// Wait for the write; resolves to the stream entry ID.
    pub async fn wait(self) -> Result<String, StreamError> {
        self.rx.await.unwrap_or(Err(StreamError::SubmitterClosed))
    }
}

impl JobSubmitter {
    /// Start the writer task; at most `capacity` jobs wait in the queue.
    pub fn spawn(writer: Arc<dyn StreamWriter>, capacity: usize) -> (Self, SubmitterHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(write_loop(writer, rx, stop_rx));

        (Self { tx }, SubmitterHandle { stop, task })
    }

    /// Queue a job, waiting for room when the queue is full.
    pub async fn submit(&self, job: Job) -> Result<JobTicket, StreamError> {
        let (reply, rx) = oneshot::channel();
        let jid = job.jid.clone();

        self.tx
            .send(Submission { job, reply })
            .await
            .map_err(|_| StreamError::SubmitterClosed)?;

        Ok(JobTicket { jid, rx })
    }
}

impl SubmitterHandle {
    /// Stop accepting jobs, write everything already queued, and join the task.
    pub async fn shutdown(self) -> SubmitterStats {
        let _ = self.stop.send(true);
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Job submitter task failed");
                SubmitterStats::default()
            }
        }
    }
}

async fn write_loop(
    writer: Arc<dyn StreamWriter>,
    mut rx: mpsc::Receiver<Submission>,
    mut stop: watch::Receiver<bool>,
) -> SubmitterStats {
    let mut stats = SubmitterStats::default();

    loop {
        tokio::select! {
            biased;
            next = rx.recv() => match next {
                Some(submission) => write_one(writer.as_ref(), submission, &mut stats).await,
                None => break,
            },
            _ = wait_for_shutdown(&mut stop) => {
                rx.close();
                while let Some(submission) = rx.recv().await {
                    write_one(writer.as_ref(), submission, &mut stats).await;
                }
                break;
            }
        }
    }

    info!(written = stats.written, failed = stats.failed, "Job submitter stopped");
    stats
}

async fn write_one(writer: &dyn StreamWriter, submission: Submission, stats: &mut SubmitterStats) {
    let Submission { job, reply } = submission;
    let result = writer.enqueue(&job).await;

    match &result {
        Ok(id) => {
            stats.written += 1;
            debug!(jid = %job.jid, message_id = %id, "Submitted job");
        }
        Err(e) => {
            stats.failed += 1;
            error!(jid = %job.jid, kind = %job.kind, error = %e, "Failed to submit job");
        }
    }

    // The caller may have dropped its ticket
    let _ = reply.send(result);
}
