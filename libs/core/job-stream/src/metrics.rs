//! Prometheus metrics for job streams
//!
//! Counters and gauges are recorded through the `metrics` facade; nothing is
//! exported until [`init_metrics`] installs the Prometheus recorder.

use crate::error::StreamError;
use crate::job::{Disposition, FailureKind, JobResult};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder.
///
/// Call this once at startup. Subsequent calls are no-ops.
pub fn init_metrics() -> Result<(), StreamError> {
    PROMETHEUS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| StreamError::Config(format!("failed to install Prometheus recorder: {}", e)))?;
        info!("Prometheus metrics initialized");
        Ok::<_, StreamError>(handle)
    })?;
    Ok(())
}

/// Get the Prometheus handle for rendering metrics
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    prometheus_handle().map(|h| h.render()).unwrap_or_default()
}

/// Metrics helper labelled by stream and notifier
#[derive(Debug, Clone)]
pub struct StreamMetrics {
    stream: String,
    notifier: String,
}

impl StreamMetrics {
    pub fn new(stream: impl Into<String>, notifier: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            notifier: notifier.into(),
        }
    }

    /// Record entries fetched by one group read
    pub fn messages_read(&self, count: usize) {
        counter!(
            "job_stream_messages_read_total",
            "stream" => self.stream.clone(),
            "notifier" => self.notifier.clone()
        )
        .increment(count as u64);
    }

    /// Record entries taken over from stalled consumers
    pub fn messages_claimed(&self, count: usize) {
        counter!(
            "job_stream_messages_claimed_total",
            "stream" => self.stream.clone(),
            "notifier" => self.notifier.clone()
        )
        .increment(count as u64);
    }

    /// Record one processed job
    pub fn job_result(&self, result: &JobResult) {
        let status = if result.success { "success" } else { "failed" };
        counter!(
            "job_stream_jobs_processed_total",
            "stream" => self.stream.clone(),
            "notifier" => self.notifier.clone(),
            "status" => status
        )
        .increment(1);

        histogram!(
            "job_stream_job_duration_seconds",
            "stream" => self.stream.clone(),
            "notifier" => self.notifier.clone()
        )
        .record(result.duration.as_secs_f64());

        if let Some(kind) = result.error_kind {
            counter!(
                "job_stream_job_errors_total",
                "stream" => self.stream.clone(),
                "notifier" => self.notifier.clone(),
                "kind" => failure_label(kind)
            )
            .increment(1);
        }

        if result.disposition == Disposition::DeadLettered {
            counter!(
                "job_stream_jobs_dead_lettered_total",
                "stream" => self.stream.clone(),
                "notifier" => self.notifier.clone()
            )
            .increment(1);
        }
    }

    /// Record a failed group read
    pub fn read_error(&self) {
        counter!(
            "job_stream_read_errors_total",
            "stream" => self.stream.clone(),
            "notifier" => self.notifier.clone()
        )
        .increment(1);
    }

    /// Update the number of jobs currently queued or in flight
    pub fn in_flight(&self, count: usize) {
        gauge!(
            "job_stream_jobs_in_flight",
            "stream" => self.stream.clone(),
            "notifier" => self.notifier.clone()
        )
        .set(count as f64);
    }
}

fn failure_label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::Decode => "decode",
        FailureKind::Send => "send",
        FailureKind::Ack => "ack",
    }
}
