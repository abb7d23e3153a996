//! Bounded worker pool draining a stream through a consumer group.
//!
//! One poll task reads batches sized to the free capacity of a bounded job
//! channel, `max_workers` worker tasks decode, send and settle one message at
//! a time, and one aggregator task collects the [`JobResult`]s:
//!
//! ```text
//! read_group ──► job channel (cap = max_workers) ──► workers ──► result channel ──► aggregator
//!     ▲                                                  │
//!     └── claim_idle (startup + every claim_interval)    └── ack / ack-delete / dead-letter
//! ```
//!
//! Delivery is at-least-once. A message is settled only after its send
//! finished; failures stay pending (or are acknowledged when
//! `ack_on_failure` is set) and come back through idle-claim until they
//! reach their retry limit, at which point they are dead-lettered.
//!
//! Entries stay in the group's pending list while they wait in the job
//! channel or are being sent, so idle-claim can return them to this very
//! pool. The pool tracks the IDs it has dispatched and drops claimed entries
//! that are still in flight.

use crate::admin::StreamAdmin;
use crate::codec;
use crate::config::ConsumerConfig;
use crate::consumer::StreamReader;
use crate::dlq::{DeadLetterQueue, DeadLetterSink};
use crate::error::{ErrorCategory, StreamError};
use crate::job::{self, Disposition, FailureKind, Job, JobResult};
use crate::master::Master;
use crate::message::Message;
use crate::metrics::StreamMetrics;
use crate::notifier::Notifier;
use crate::registry::MessageKey;
use crate::transport::StreamTransport;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Counters accumulated over one [`WorkerPool::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub decode_failures: u64,
    pub dead_lettered: u64,
    pub retained: u64,
    /// Messages taken over from idle consumers
    pub claimed: u64,
}

impl PoolStats {
    fn record(&mut self, result: &JobResult) {
        self.processed += 1;
        if result.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        if result.error_kind == Some(FailureKind::Decode) {
            self.decode_failures += 1;
        }
        match result.disposition {
            Disposition::DeadLettered => self.dead_lettered += 1,
            Disposition::Retained | Disposition::Unsettled => self.retained += 1,
            Disposition::Deleted | Disposition::Acknowledged => {}
        }
    }
}

/// IDs of messages dispatched to workers and not yet settled.
#[derive(Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<String>>>);

impl InFlight {
    async fn release(&self, id: &str) {
        self.0.lock().await.remove(id);
    }

    async fn len(&self) -> usize {
        self.0.lock().await.len()
    }
}

/// Worker pool consuming one stream with one [`Notifier`].
pub struct WorkerPool<N: Notifier> {
    reader: Arc<dyn StreamReader>,
    admin: Option<Arc<dyn StreamAdmin>>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    notifier: Arc<N>,
    config: Arc<ConsumerConfig>,
    metrics: StreamMetrics,
    observer: Option<mpsc::UnboundedSender<JobResult>>,
}

impl<N: Notifier> WorkerPool<N> {
    pub fn new(reader: Arc<dyn StreamReader>, notifier: N, config: ConsumerConfig) -> Self {
        let metrics = StreamMetrics::new(&config.stream_key, notifier.name());
        Self {
            reader,
            admin: None,
            dead_letters: None,
            notifier: Arc::new(notifier),
            config: Arc::new(config),
            metrics,
            observer: None,
        }
    }

    /// Wire reader, admin and dead letter stream from one transport.
    pub fn from_transport(
        transport: Arc<StreamTransport>,
        notifier: N,
        config: ConsumerConfig,
    ) -> Self {
        let master = Arc::new(Master::new(transport.clone(), &config));
        let dlq = config
            .dlq_stream
            .as_ref()
            .map(|key| Arc::new(DeadLetterQueue::new(&transport, key)) as Arc<dyn DeadLetterSink>);

        let mut pool = Self::new(master.clone(), notifier, config).with_admin(master);
        pool.dead_letters = dlq;
        pool
    }

    /// Admin used to recreate the group when it disappears.
    pub fn with_admin(mut self, admin: Arc<dyn StreamAdmin>) -> Self {
        self.admin = Some(admin);
        self
    }

    /// Where jobs go once they exhaust their retries.
    pub fn with_dead_letters(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    /// Receive a copy of every result.
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<JobResult>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Run until `shutdown` turns `true`.
    ///
    /// Returns once the poll loop stopped, every worker drained the job
    /// channel and the aggregator saw the last result. A permanent read error
    /// stops the pool and is returned after the same drain.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<PoolStats, StreamError> {
        let max_workers = self.config.max_workers.max(1);

        info!(
            stream = %self.config.stream_key,
            group = %self.reader.group(),
            consumer = %self.reader.consumer(),
            notifier = %self.notifier.name(),
            max_workers,
            batch_size = self.config.batch_size,
            block_ms = self.config.block.as_millis() as u64,
            ack_on_failure = self.config.ack_on_failure,
            "Starting worker pool"
        );

        if self.config.claim_overlaps_sends() {
            warn!(
                min_idle_ms = self.config.min_idle.as_millis() as u64,
                send_timeout_ms = self.config.send_timeout.map(|t| t.as_millis() as u64),
                "min_idle does not cover queue wait plus send timeout; slow sends will be claimed while in flight"
            );
        }

        let (job_tx, job_rx) = mpsc::channel::<Message>(max_workers);
        let (result_tx, result_rx) = mpsc::channel::<JobResult>(max_workers);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let in_flight = InFlight::default();

        let mut workers = JoinSet::new();
        for worker_id in 1..=max_workers {
            let worker = Worker {
                id: worker_id,
                reader: self.reader.clone(),
                dead_letters: self.dead_letters.clone(),
                notifier: self.notifier.clone(),
                config: self.config.clone(),
                in_flight: in_flight.clone(),
            };
            workers.spawn(worker.run(job_rx.clone(), result_tx.clone()));
        }
        drop(result_tx);

        let aggregator = tokio::spawn(aggregate(
            result_rx,
            self.metrics.clone(),
            self.observer.clone(),
        ));

        let polled = self.poll(&job_tx, &in_flight, &mut shutdown).await;
        drop(job_tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task failed");
            }
        }

        let mut stats = match aggregator.await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Result aggregator failed");
                PoolStats::default()
            }
        };

        let claimed = polled?;
        stats.claimed = claimed;

        info!(
            stream = %self.config.stream_key,
            processed = stats.processed,
            succeeded = stats.succeeded,
            failed = stats.failed,
            dead_lettered = stats.dead_lettered,
            claimed = stats.claimed,
            "Worker pool stopped"
        );

        Ok(stats)
    }

    /// Poll loop; returns how many claimed messages were dispatched.
    async fn poll(
        &self,
        job_tx: &mpsc::Sender<Message>,
        in_flight: &InFlight,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<u64, StreamError> {
        let mut claimed_total = 0u64;
        let mut consecutive_errors: u32 = 0;
        let mut next_claim = Instant::now();
        let mut claim_cursor = CLAIM_START.to_string();

        loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping poll loop");
                return Ok(claimed_total);
            }

            // Wait for a free slot instead of reading what cannot be dispatched
            if job_tx.capacity() == 0 {
                tokio::select! {
                    permit = job_tx.reserve() => match permit {
                        Ok(permit) => drop(permit),
                        Err(_) => return Ok(claimed_total),
                    },
                    _ = wait_for_shutdown(shutdown) => {
                        info!("Received shutdown signal, stopping poll loop");
                        return Ok(claimed_total);
                    }
                }
                continue;
            }

            if Instant::now() >= next_claim {
                match self.claim_idle(&mut claim_cursor, job_tx.capacity(), in_flight).await {
                    Ok(messages) => {
                        claimed_total += messages.len() as u64;
                        for msg in messages {
                            if !dispatch(job_tx, msg, shutdown).await {
                                return Ok(claimed_total);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to claim idle messages, retrying next interval");
                        claim_cursor = CLAIM_START.to_string();
                    }
                }
                // A cursor past the start means more idle entries are waiting
                if claim_cursor == CLAIM_START {
                    next_claim = Instant::now() + self.config.claim_interval;
                }
                continue;
            }

            let count = job_tx.capacity().min(self.config.batch_size.max(1));

            match self.reader.read_group(count).await {
                Ok(messages) => {
                    if consecutive_errors > 0 {
                        info!(consecutive_errors, "Stream reads recovered");
                        consecutive_errors = 0;
                    }
                    if messages.is_empty() {
                        continue;
                    }

                    self.metrics.messages_read(messages.len());
                    {
                        let mut tracked = in_flight.0.lock().await;
                        tracked.extend(messages.iter().map(|msg| msg.id.clone()));
                    }
                    for msg in messages {
                        debug!(message_id = %msg.id, "Dispatching message");
                        if !dispatch(job_tx, msg, shutdown).await {
                            return Ok(claimed_total);
                        }
                    }
                    self.metrics.in_flight(in_flight.len().await);
                }
                Err(e) => {
                    self.metrics.read_error();
                    consecutive_errors = consecutive_errors.saturating_add(1);

                    if e.is_nogroup_error() {
                        let Some(admin) = &self.admin else {
                            error!(error = %e, "Consumer group missing");
                            return Err(e);
                        };
                        warn!("Consumer group missing, recreating");
                        if let Err(create_err) = admin.create_group().await {
                            error!(error = %create_err, "Failed to recreate consumer group");
                        }
                    } else if e.category() == ErrorCategory::Permanent {
                        error!(error = %e, "Unrecoverable stream read error");
                        return Err(e);
                    }

                    let delay =
                        Duration::from_millis(e.backoff_delay_ms(consecutive_errors - 1));
                    warn!(
                        error = %e,
                        consecutive_errors,
                        backoff_ms = delay.as_millis() as u64,
                        "Stream read failed, backing off"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = wait_for_shutdown(shutdown) => {
                            info!("Received shutdown signal during backoff");
                            return Ok(claimed_total);
                        }
                    }
                }
            }
        }
    }

    /// Claim one page of idle entries, at most `count`, skipping entries this
    /// pool is still processing. Stamps each delivery count from the PEL.
    ///
    /// The in-flight set stays locked across the claim so a worker cannot
    /// settle and release an entry between the claim reply and the check.
    async fn claim_idle(
        &self,
        cursor: &mut String,
        count: usize,
        in_flight: &InFlight,
    ) -> Result<Vec<Message>, StreamError> {
        let mut messages = {
            let mut tracked = in_flight.0.lock().await;
            let page = self
                .reader
                .claim_idle(self.config.min_idle, cursor, count.max(1))
                .await?;

            if !page.deleted_ids.is_empty() {
                warn!(
                    count = page.deleted_ids.len(),
                    ids = ?page.deleted_ids,
                    "Pending entries were deleted from the stream before they could be claimed"
                );
            }
            *cursor = page.next_cursor;

            let mut fresh = Vec::with_capacity(page.messages.len());
            for msg in page.messages {
                if tracked.insert(msg.id.clone()) {
                    fresh.push(msg);
                } else {
                    debug!(message_id = %msg.id, "Claimed message is still in flight, skipping");
                }
            }
            fresh
        };
        if messages.is_empty() {
            return Ok(messages);
        }

        let deliveries = self.delivery_counts(&messages).await;
        for msg in &mut messages {
            // Claiming is at least the second delivery
            msg.deliveries = deliveries.get(&msg.id).copied().unwrap_or(2).max(2);
        }

        self.metrics.messages_claimed(messages.len());
        info!(count = messages.len(), "Claimed idle messages");
        Ok(messages)
    }

    async fn delivery_counts(&self, messages: &[Message]) -> HashMap<String, u32> {
        let mut counts = HashMap::with_capacity(messages.len());
        for msg in messages {
            match self.reader.pending_entries(&msg.id, &msg.id, 1).await {
                Ok(entries) => {
                    if let Some(entry) = entries.into_iter().next() {
                        counts.insert(entry.id, entry.deliveries);
                    }
                }
                Err(e) => {
                    debug!(message_id = %msg.id, error = %e, "Failed to look up delivery count");
                }
            }
        }
        counts
    }
}

/// XAUTOCLAIM cursor that starts (and ends) a scan of the pending list.
const CLAIM_START: &str = "0-0";

/// Push one message onto the job channel; false once the pool should stop.
async fn dispatch(
    job_tx: &mpsc::Sender<Message>,
    msg: Message,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        sent = job_tx.send(msg) => sent.is_ok(),
        _ = wait_for_shutdown(shutdown) => {
            info!("Received shutdown signal while dispatching");
            false
        }
    }
}

/// One worker task's view of the pool.
struct Worker<N: Notifier> {
    id: usize,
    reader: Arc<dyn StreamReader>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    notifier: Arc<N>,
    config: Arc<ConsumerConfig>,
    in_flight: InFlight,
}

impl<N: Notifier> Worker<N> {
    async fn run(
        self,
        jobs: Arc<Mutex<mpsc::Receiver<Message>>>,
        results: mpsc::Sender<JobResult>,
    ) {
        debug!(worker_id = self.id, "Worker started");

        loop {
            let next = { jobs.lock().await.recv().await };
            let Some(msg) = next else { break };

            let id = msg.id.clone();
            let result = self.process(msg).await;
            self.in_flight.release(&id).await;
            if results.send(result).await.is_err() {
                break;
            }
        }

        debug!(worker_id = self.id, "Worker stopped");
    }

    /// Decode, send and settle one message. Always yields exactly one result.
    async fn process(&self, msg: Message) -> JobResult {
        let started = Instant::now();

        let decoded = codec::decode(&msg)
            .and_then(|job| job.decode_payload::<N::Payload>().map(|payload| (job, payload)));

        let (job, payload) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => return self.discard_poison(&msg, e.into(), started).await,
        };

        let attempts = msg.deliveries.max(1);
        let retry_limit = job.effective_retry_limit(self.config.retries);

        debug!(
            worker_id = self.id,
            message_id = %msg.id,
            jid = %job.jid,
            attempts,
            "Processing job"
        );

        match self.send(&job, payload).await {
            Ok(()) => self.settle_success(&job, attempts, retry_limit, started).await,
            Err(e) => {
                warn!(
                    worker_id = self.id,
                    message_id = %msg.id,
                    jid = %job.jid,
                    attempts,
                    retry_limit,
                    error = %e,
                    "Job failed"
                );
                let disposition = self.settle_failure(&msg, &e, attempts, retry_limit).await;
                JobResult::failed(&msg.id, &job.jid, FailureKind::Send, &e, disposition)
                    .with_attempts(attempts, retry_limit)
                    .with_duration(started.elapsed())
            }
        }
    }

    async fn send(&self, job: &Job, payload: N::Payload) -> Result<(), StreamError> {
        match self.config.send_timeout {
            Some(limit) => tokio::time::timeout(limit, self.notifier.send(job, payload))
                .await
                .unwrap_or(Err(StreamError::SendTimeout(limit))),
            None => self.notifier.send(job, payload).await,
        }
    }

    /// Poison message: never sent, removed so it cannot block the stream.
    async fn discard_poison(&self, msg: &Message, err: StreamError, started: Instant) -> JobResult {
        let jid = msg
            .field(MessageKey::Jid.as_ref())
            .and_then(|f| f.value_str())
            .unwrap_or_default()
            .to_string();

        warn!(
            worker_id = self.id,
            message_id = %msg.id,
            fields = ?msg.field_names(),
            error = %err,
            "Discarding undecodable message"
        );

        let disposition = match self.reader.ack_delete(&[msg.id.clone()]).await {
            Ok(_) => Disposition::Deleted,
            Err(e) => {
                error!(message_id = %msg.id, error = %e, "Failed to delete undecodable message");
                Disposition::Unsettled
            }
        };

        JobResult::failed(&msg.id, jid, FailureKind::Decode, &err, disposition)
            .with_attempts(msg.deliveries.max(1), self.config.retries)
            .with_duration(started.elapsed())
    }

    async fn settle_success(
        &self,
        job: &Job,
        attempts: u32,
        retry_limit: u32,
        started: Instant,
    ) -> JobResult {
        let ids = [job.message_id.clone()];
        let settled = if self.config.delete_on_ack {
            self.reader.ack_delete(&ids).await.map(|_| Disposition::Deleted)
        } else {
            self.reader.ack(&ids).await.map(|_| Disposition::Acknowledged)
        };

        match settled {
            Ok(disposition) => {
                debug!(worker_id = self.id, message_id = %job.message_id, jid = %job.jid, "Job completed");
                JobResult::succeeded(job, attempts, retry_limit, started.elapsed(), disposition)
            }
            Err(e) => {
                error!(message_id = %job.message_id, jid = %job.jid, error = %e, "Failed to acknowledge job");
                JobResult::failed(&job.message_id, &job.jid, FailureKind::Ack, &e, Disposition::Unsettled)
                    .with_attempts(attempts, retry_limit)
                    .with_duration(started.elapsed())
            }
        }
    }

    async fn settle_failure(
        &self,
        msg: &Message,
        err: &StreamError,
        attempts: u32,
        retry_limit: u32,
    ) -> Disposition {
        let ids = [msg.id.clone()];

        if self.config.ack_on_failure {
            return match self.reader.ack_delete(&ids).await {
                Ok(_) => Disposition::Deleted,
                Err(e) => {
                    error!(message_id = %msg.id, error = %e, "Failed to acknowledge failed job");
                    Disposition::Unsettled
                }
            };
        }

        if job::should_retry(attempts, retry_limit, err.category()) {
            return Disposition::Retained;
        }

        let mut disposition = Disposition::Deleted;
        if let Some(sink) = &self.dead_letters {
            match sink.dead_letter(msg, &err.to_string(), attempts).await {
                Ok(_) => disposition = Disposition::DeadLettered,
                Err(e) => {
                    // Leave it pending; the next claim retries the dead-lettering
                    error!(message_id = %msg.id, error = %e, "Failed to dead-letter job");
                    return Disposition::Unsettled;
                }
            }
        } else {
            warn!(message_id = %msg.id, attempts, "Retries exhausted, dropping job");
        }

        match self.reader.ack_delete(&ids).await {
            Ok(_) => disposition,
            Err(e) => {
                error!(message_id = %msg.id, error = %e, "Failed to remove exhausted job");
                Disposition::Unsettled
            }
        }
    }
}

async fn aggregate(
    mut results: mpsc::Receiver<JobResult>,
    metrics: StreamMetrics,
    observer: Option<mpsc::UnboundedSender<JobResult>>,
) -> PoolStats {
    let mut stats = PoolStats::default();

    while let Some(result) = results.recv().await {
        stats.record(&result);
        metrics.job_result(&result);

        if result.success {
            debug!(
                message_id = %result.msg_id,
                jid = %result.jid,
                duration_ms = result.duration.as_millis() as u64,
                succeeded = stats.succeeded,
                failed = stats.failed,
                "Job succeeded"
            );
        } else {
            debug!(
                message_id = %result.msg_id,
                jid = %result.jid,
                error = ?result.error,
                disposition = ?result.disposition,
                succeeded = stats.succeeded,
                failed = stats.failed,
                "Job failed"
            );
        }

        if let Some(observer) = &observer {
            let _ = observer.send(result);
        }
    }

    stats
}

/// Resolves once shutdown is requested; never resolves if the sender is gone.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::{ClaimPage, PendingEntry};
    use crate::message::Field;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory reader: serves queued messages, records acks and deletes.
    #[derive(Default)]
    struct FakeReader {
        queue: StdMutex<VecDeque<Message>>,
        idle: StdMutex<Vec<Message>>,
        acked: StdMutex<Vec<String>>,
        deleted: StdMutex<Vec<String>>,
        read_error: StdMutex<Option<StreamError>>,
        max_read: AtomicUsize,
    }

    impl FakeReader {
        fn with_messages(messages: Vec<Message>) -> Self {
            let reader = Self::default();
            reader.queue.lock().unwrap().extend(messages);
            reader
        }

        fn acked(&self) -> Vec<String> {
            self.acked.lock().unwrap().clone()
        }

        fn deleted(&self) -> Vec<String> {
            self.deleted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StreamReader for FakeReader {
        fn group(&self) -> &str {
            "test-group"
        }

        fn consumer(&self) -> &str {
            "test-consumer"
        }

        async fn read_group(&self, count: usize) -> Result<Vec<Message>, StreamError> {
            if let Some(err) = self.read_error.lock().unwrap().take() {
                return Err(err);
            }
            self.max_read.fetch_max(count, Ordering::SeqCst);

            let batch: Vec<Message> = {
                let mut queue = self.queue.lock().unwrap();
                let n = count.min(queue.len());
                queue.drain(..n).collect()
            };
            if batch.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Ok(batch)
        }

        async fn range(&self, _start: &str, _end: &str) -> Result<Vec<Message>, StreamError> {
            Ok(vec![])
        }

        async fn ack(&self, ids: &[String]) -> Result<i64, StreamError> {
            self.acked.lock().unwrap().extend_from_slice(ids);
            Ok(ids.len() as i64)
        }

        async fn ack_delete(&self, ids: &[String]) -> Result<i64, StreamError> {
            self.acked.lock().unwrap().extend_from_slice(ids);
            self.deleted.lock().unwrap().extend_from_slice(ids);
            Ok(ids.len() as i64)
        }

        async fn claim_idle(
            &self,
            _min_idle: Duration,
            _cursor: &str,
            _count: usize,
        ) -> Result<ClaimPage, StreamError> {
            Ok(ClaimPage {
                next_cursor: "0-0".to_string(),
                messages: std::mem::take(&mut *self.idle.lock().unwrap()),
                deleted_ids: vec![],
            })
        }

        async fn pending(&self) -> Result<Vec<Message>, StreamError> {
            Ok(vec![])
        }

        async fn pending_entries(
            &self,
            _start: &str,
            _end: &str,
            _count: usize,
        ) -> Result<Vec<PendingEntry>, StreamError> {
            Ok(vec![])
        }
    }

    /// Reader with a pending entries list: delivered entries stay pending
    /// until acknowledged, and idle-claim scans them by cursor the way
    /// XAUTOCLAIM does.
    #[derive(Default)]
    struct PendingListReader {
        queue: StdMutex<VecDeque<Message>>,
        pending: StdMutex<Vec<PendingSlot>>,
        claim_counts: StdMutex<Vec<usize>>,
    }

    struct PendingSlot {
        msg: Message,
        delivered: Instant,
        deliveries: u32,
    }

    impl PendingListReader {
        fn with_messages(messages: Vec<Message>) -> Self {
            let reader = Self::default();
            reader.queue.lock().unwrap().extend(messages);
            reader
        }

        fn with_pending(messages: Vec<Message>) -> Self {
            let reader = Self::default();
            reader
                .pending
                .lock()
                .unwrap()
                .extend(messages.into_iter().map(|msg| PendingSlot {
                    msg,
                    delivered: Instant::now(),
                    deliveries: 1,
                }));
            reader
        }

        fn pending_len(&self) -> usize {
            self.pending.lock().unwrap().len()
        }

        fn claim_counts(&self) -> Vec<usize> {
            self.claim_counts.lock().unwrap().clone()
        }

        fn settle(&self, ids: &[String]) -> i64 {
            let mut pending = self.pending.lock().unwrap();
            let before = pending.len();
            pending.retain(|slot| !ids.contains(&slot.msg.id));
            (before - pending.len()) as i64
        }
    }

    #[async_trait]
    impl StreamReader for PendingListReader {
        fn group(&self) -> &str {
            "test-group"
        }

        fn consumer(&self) -> &str {
            "test-consumer"
        }

        async fn read_group(&self, count: usize) -> Result<Vec<Message>, StreamError> {
            let batch: Vec<Message> = {
                let mut queue = self.queue.lock().unwrap();
                let n = count.min(queue.len());
                queue.drain(..n).collect()
            };
            if batch.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
                return Ok(batch);
            }

            let now = Instant::now();
            self.pending.lock().unwrap().extend(batch.iter().map(|msg| PendingSlot {
                msg: msg.clone(),
                delivered: now,
                deliveries: 1,
            }));
            Ok(batch)
        }

        async fn range(&self, _start: &str, _end: &str) -> Result<Vec<Message>, StreamError> {
            Ok(vec![])
        }

        async fn ack(&self, ids: &[String]) -> Result<i64, StreamError> {
            Ok(self.settle(ids))
        }

        async fn ack_delete(&self, ids: &[String]) -> Result<i64, StreamError> {
            Ok(self.settle(ids))
        }

        async fn claim_idle(
            &self,
            min_idle: Duration,
            cursor: &str,
            count: usize,
        ) -> Result<ClaimPage, StreamError> {
            self.claim_counts.lock().unwrap().push(count);

            let now = Instant::now();
            let mut pending = self.pending.lock().unwrap();
            let mut page = ClaimPage {
                next_cursor: "0-0".to_string(),
                ..Default::default()
            };
            for slot in pending.iter_mut().filter(|slot| slot.msg.id.as_str() >= cursor) {
                if page.messages.len() == count {
                    page.next_cursor = slot.msg.id.clone();
                    break;
                }
                if now.duration_since(slot.delivered) >= min_idle {
                    slot.delivered = now;
                    slot.deliveries += 1;
                    page.messages.push(slot.msg.clone());
                }
            }
            Ok(page)
        }

        async fn pending(&self) -> Result<Vec<Message>, StreamError> {
            Ok(vec![])
        }

        async fn pending_entries(
            &self,
            start: &str,
            _end: &str,
            _count: usize,
        ) -> Result<Vec<PendingEntry>, StreamError> {
            let now = Instant::now();
            Ok(self
                .pending
                .lock()
                .unwrap()
                .iter()
                .filter(|slot| slot.msg.id == start)
                .map(|slot| PendingEntry {
                    id: slot.msg.id.clone(),
                    consumer: "test-consumer".to_string(),
                    idle: now.duration_since(slot.delivered),
                    deliveries: slot.deliveries,
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        letters: StdMutex<Vec<(String, String, u32)>>,
    }

    #[async_trait]
    impl DeadLetterSink for RecordingSink {
        async fn dead_letter(
            &self,
            message: &Message,
            error: &str,
            attempts: u32,
        ) -> Result<String, StreamError> {
            self.letters
                .lock()
                .unwrap()
                .push((message.id.clone(), error.to_string(), attempts));
            Ok(format!("dlq-{}", message.id))
        }
    }

    #[derive(Debug, Deserialize)]
    struct EmailPayload {
        to: String,
    }

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        calls: Arc<AtomicUsize>,
        seen: Arc<StdMutex<Vec<String>>>,
        fail_with: Option<ErrorCategory>,
        delay: Duration,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        type Payload = EmailPayload;

        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, job: &Job, payload: EmailPayload) -> Result<(), StreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.seen.lock().unwrap().push(format!("{}:{}", job.jid, payload.to));
            match self.fail_with {
                Some(ErrorCategory::Transient) => Err(StreamError::transient("smtp unavailable")),
                Some(ErrorCategory::Permanent) => Err(StreamError::permanent("mailbox does not exist")),
                None => Ok(()),
            }
        }
    }

    fn job_message(id: usize, payload: &str) -> Message {
        let job = Job::new("email", "email-consumer", "test", payload.as_bytes().to_vec());
        Message::new(format!("{}-0", id), codec::encode(&job))
    }

    fn config() -> ConsumerConfig {
        ConsumerConfig::new("test:jobs", "test-group")
            .with_consumer_name("test-consumer")
            .with_block(Duration::from_millis(5))
            .with_max_workers(4)
            .with_retries(3)
            .with_send_timeout(Some(Duration::from_secs(1)))
    }

    async fn run_until<N: Notifier>(
        pool: WorkerPool<N>,
        expected: usize,
    ) -> (PoolStats, Vec<JobResult>) {
        let (observer_tx, mut observer_rx) = mpsc::unbounded_channel();
        let pool = pool.with_observer(observer_tx);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { pool.run(stop_rx).await });

        let mut results = Vec::new();
        while results.len() < expected {
            let result = tokio::time::timeout(Duration::from_secs(5), observer_rx.recv())
                .await
                .expect("timed out waiting for results")
                .expect("observer closed early");
            results.push(result);
        }

        stop_tx.send(true).unwrap();
        let stats = handle.await.unwrap().unwrap();
        (stats, results)
    }

    #[tokio::test]
    async fn test_every_message_processed_once() {
        let messages: Vec<Message> = (1..=20)
            .map(|i| job_message(i, &format!(r#"{{"to":"user{}@example.com"}}"#, i)))
            .collect();
        let reader = Arc::new(FakeReader::with_messages(messages));
        let notifier = RecordingNotifier::default();
        let calls = notifier.calls.clone();
        let seen = notifier.seen.clone();

        let pool = WorkerPool::new(reader.clone(), notifier, config());
        let (stats, results) = run_until(pool, 20).await;

        assert_eq!(results.len(), 20);
        assert!(results.iter().all(|r| r.success));
        let ids: HashSet<&str> = results.iter().map(|r| r.msg_id.as_str()).collect();
        assert_eq!(ids.len(), 20);

        assert_eq!(calls.load(Ordering::SeqCst), 20);
        let unique_sends: HashSet<String> = seen.lock().unwrap().iter().cloned().collect();
        assert_eq!(unique_sends.len(), 20);

        assert_eq!(reader.deleted().len(), 20);
        assert_eq!(stats.processed, 20);
        assert_eq!(stats.succeeded, 20);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_reads_never_exceed_worker_capacity() {
        let messages: Vec<Message> = (1..=12)
            .map(|i| job_message(i, r#"{"to":"a@example.com"}"#))
            .collect();
        let reader = Arc::new(FakeReader::with_messages(messages));
        let pool = WorkerPool::new(
            reader.clone(),
            RecordingNotifier::default(),
            config().with_max_workers(2).with_batch_size(50),
        );

        run_until(pool, 12).await;
        assert!(reader.max_read.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_decode_failure_skips_send_and_deletes() {
        let missing_jid = Message::new("1-0", vec![Field::new("payload", r#"{"to":"a@example.com"}"#)]);
        let bad_payload = job_message(2, "not json");
        let reader = Arc::new(FakeReader::with_messages(vec![missing_jid, bad_payload]));
        let notifier = RecordingNotifier::default();
        let calls = notifier.calls.clone();

        let pool = WorkerPool::new(reader.clone(), notifier, config());
        let (stats, results) = run_until(pool, 2).await;

        assert!(results.iter().all(|r| !r.success));
        assert!(results.iter().all(|r| r.error_kind == Some(FailureKind::Decode)));
        assert!(results.iter().all(|r| r.disposition == Disposition::Deleted));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let deleted: HashSet<String> = reader.deleted().into_iter().collect();
        assert!(deleted.contains("1-0"));
        assert!(deleted.contains("2-0"));
        assert_eq!(stats.decode_failures, 2);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retained() {
        let reader = Arc::new(FakeReader::with_messages(vec![job_message(
            1,
            r#"{"to":"a@example.com"}"#,
        )]));
        let notifier = RecordingNotifier {
            fail_with: Some(ErrorCategory::Transient),
            ..Default::default()
        };

        let pool = WorkerPool::new(reader.clone(), notifier, config());
        let (stats, results) = run_until(pool, 1).await;

        assert_eq!(results[0].disposition, Disposition::Retained);
        assert_eq!(results[0].error_kind, Some(FailureKind::Send));
        assert_eq!(results[0].attempts, 1);
        assert_eq!(results[0].retry_limit, 3);
        assert!(reader.acked().is_empty());
        assert_eq!(stats.retained, 1);
    }

    #[tokio::test]
    async fn test_ack_on_failure_deletes() {
        let reader = Arc::new(FakeReader::with_messages(vec![job_message(
            1,
            r#"{"to":"a@example.com"}"#,
        )]));
        let notifier = RecordingNotifier {
            fail_with: Some(ErrorCategory::Transient),
            ..Default::default()
        };

        let pool = WorkerPool::new(reader.clone(), notifier, config().with_ack_on_failure(true));
        let (_, results) = run_until(pool, 1).await;

        assert!(!results[0].success);
        assert_eq!(results[0].disposition, Disposition::Deleted);
        assert_eq!(reader.deleted(), vec!["1-0".to_string()]);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_dead_lettered() {
        let reader = Arc::new(FakeReader::with_messages(vec![job_message(
            1,
            r#"{"to":"a@example.com"}"#,
        )]));
        let sink = Arc::new(RecordingSink::default());
        let notifier = RecordingNotifier {
            fail_with: Some(ErrorCategory::Permanent),
            ..Default::default()
        };

        let pool = WorkerPool::new(reader.clone(), notifier, config()).with_dead_letters(sink.clone());
        let (stats, results) = run_until(pool, 1).await;

        assert_eq!(results[0].disposition, Disposition::DeadLettered);
        let letters = sink.letters.lock().unwrap().clone();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].0, "1-0");
        assert!(letters[0].1.contains("mailbox does not exist"));
        assert_eq!(reader.deleted(), vec!["1-0".to_string()]);
        assert_eq!(stats.dead_lettered, 1);
    }

    #[tokio::test]
    async fn test_claimed_message_exhausts_retries() {
        let reader = Arc::new(FakeReader::default());
        let job = Job::new("email", "", "", br#"{"to":"a@example.com"}"#.to_vec()).with_retry_limit(2);
        reader
            .idle
            .lock()
            .unwrap()
            .push(Message::new("7-0", codec::encode(&job)));

        let sink = Arc::new(RecordingSink::default());
        let notifier = RecordingNotifier {
            fail_with: Some(ErrorCategory::Transient),
            ..Default::default()
        };

        let pool = WorkerPool::new(reader.clone(), notifier, config()).with_dead_letters(sink.clone());
        let (stats, results) = run_until(pool, 1).await;

        assert_eq!(results[0].attempts, 2);
        assert_eq!(results[0].retry_limit, 2);
        assert_eq!(results[0].disposition, Disposition::DeadLettered);
        assert_eq!(sink.letters.lock().unwrap()[0].2, 2);
        assert_eq!(stats.claimed, 1);
    }

    #[tokio::test]
    async fn test_slow_send_is_not_claimed_back_while_in_flight() {
        let reader = Arc::new(PendingListReader::with_messages(vec![job_message(
            1,
            r#"{"to":"a@example.com"}"#,
        )]));
        let notifier = RecordingNotifier {
            delay: Duration::from_millis(300),
            ..Default::default()
        };
        let calls = notifier.calls.clone();

        let pool = WorkerPool::new(
            reader.clone(),
            notifier,
            config()
                .with_max_workers(2)
                .with_min_idle(Duration::from_millis(100))
                .with_claim_interval(Duration::from_millis(20)),
        );
        let (stats, results) = run_until(pool, 1).await;

        // The entry sat idle in the pending list past min_idle while sending
        assert!(reader.claim_counts().len() > 1);

        assert!(results[0].success);
        assert_eq!(results[0].msg_id, "1-0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.claimed, 0);
        assert_eq!(reader.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_claims_are_bounded_by_free_capacity() {
        let messages: Vec<Message> = (1..=6)
            .map(|i| job_message(i, &format!(r#"{{"to":"user{}@example.com"}}"#, i)))
            .collect();
        let reader = Arc::new(PendingListReader::with_pending(messages));
        let notifier = RecordingNotifier {
            delay: Duration::from_millis(20),
            ..Default::default()
        };
        let calls = notifier.calls.clone();

        let pool = WorkerPool::new(
            reader.clone(),
            notifier,
            config()
                .with_max_workers(2)
                .with_min_idle(Duration::from_millis(10))
                .with_claim_interval(Duration::from_millis(20)),
        );
        let (stats, results) = run_until(pool, 6).await;

        let counts = reader.claim_counts();
        assert!(!counts.is_empty());
        assert!(counts.iter().all(|&count| count <= 2), "claim counts {:?}", counts);

        let ids: HashSet<&str> = results.iter().map(|r| r.msg_id.as_str()).collect();
        assert_eq!(ids.len(), 6);
        assert!(results.iter().all(|r| r.success && r.attempts >= 2));
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(stats.claimed, 6);
        assert_eq!(reader.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_send_timeout() {
        let reader = Arc::new(FakeReader::with_messages(vec![job_message(
            1,
            r#"{"to":"a@example.com"}"#,
        )]));
        let notifier = RecordingNotifier {
            delay: Duration::from_millis(500),
            ..Default::default()
        };

        let pool = WorkerPool::new(
            reader.clone(),
            notifier,
            config().with_send_timeout(Some(Duration::from_millis(20))),
        );
        let (_, results) = run_until(pool, 1).await;

        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap_or_default().contains("timed out"));
        assert_eq!(results[0].disposition, Disposition::Retained);
    }

    #[tokio::test]
    async fn test_successful_job_without_delete_is_only_acked() {
        let reader = Arc::new(FakeReader::with_messages(vec![job_message(
            1,
            r#"{"to":"a@example.com"}"#,
        )]));

        let pool = WorkerPool::new(
            reader.clone(),
            RecordingNotifier::default(),
            config().with_delete_on_ack(false),
        );
        let (_, results) = run_until(pool, 1).await;

        assert_eq!(results[0].disposition, Disposition::Acknowledged);
        assert_eq!(reader.acked(), vec!["1-0".to_string()]);
        assert!(reader.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_permanent_read_error_stops_pool() {
        let reader = Arc::new(FakeReader::default());
        *reader.read_error.lock().unwrap() = Some(StreamError::Config("bad stream".into()));

        let pool = WorkerPool::new(reader, RecordingNotifier::default(), config());
        let (_stop_tx, stop_rx) = watch::channel(false);

        let result = tokio::time::timeout(Duration::from_secs(5), pool.run(stop_rx))
            .await
            .expect("pool did not stop");
        assert!(matches!(result, Err(StreamError::Config(_))));
    }

    #[tokio::test]
    async fn test_shutdown_with_empty_stream() {
        let pool = WorkerPool::new(
            Arc::new(FakeReader::default()),
            RecordingNotifier::default(),
            config(),
        );
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { pool.run(stop_rx).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        stop_tx.send(true).unwrap();

        let stats = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("pool did not stop")
            .unwrap()
            .unwrap();
        assert_eq!(stats, PoolStats::default());
    }
}
