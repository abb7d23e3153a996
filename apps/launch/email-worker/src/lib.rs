//! Email Worker Service
//!
//! A background worker that delivers email jobs from a Redis stream.
//!
//! ## Architecture
//!
//! ```text
//! Redis Stream (notifications:email)
//!   ↓ (Consumer Group: email-consumers)
//! WorkerPool<EmailNotifier<P>>
//!   ↓ (decodes EmailJob payloads)
//! EmailProvider
//!   ↓
//! Email Delivery
//! ```
//!
//! ## Features
//!
//! - Consumer group support for horizontal scaling
//! - Idle-claim recovery of jobs left behind by crashed workers
//! - Dead letter stream for jobs that exhaust their retries
//! - Graceful shutdown handling

use core_config::{Environment, FromEnv, RedisConfig};
use domain_notifications::{EmailNotifier, EmailStream, LogEmailProvider};
use eyre::{Result, WrapErr};
use job_stream::{Admin, ConsumerConfig, StreamAdmin, StreamTransport, WorkerPool, metrics};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Run the email worker
///
/// This is the main entry point for the worker. It:
/// 1. Sets up structured logging (env-aware: JSON for prod, pretty for dev)
/// 2. Loads Redis and consumer configuration from the environment
/// 3. Connects to Redis and makes sure the consumer group exists
/// 4. Runs the worker pool until SIGINT or SIGTERM
///
/// # Errors
///
/// Returns an error if:
/// - Redis or consumer configuration is invalid
/// - Redis connection fails
/// - The worker pool stops on an unrecoverable stream error
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();

    // Initialize tracing (env-aware: JSON for prod, pretty for dev)
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    metrics::init_metrics().wrap_err("Failed to install Prometheus recorder")?;

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        environment = ?environment,
        "Starting email worker service"
    );

    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;

    // Stream defaults come from EmailStream, the environment may override them
    let consumer_config = ConsumerConfig::from_stream_def::<EmailStream>()
        .with_env_overrides()
        .wrap_err("Failed to load consumer configuration")?;
    info!(
        stream = %consumer_config.stream_key,
        group = %consumer_config.consumer_group,
        consumer = %consumer_config.consumer_name,
        dlq = ?consumer_config.dlq_stream,
        max_workers = consumer_config.max_workers,
        "Worker configuration loaded"
    );

    info!(redis = %redis_config.redacted_uri(), "Connecting to Redis...");
    let transport = StreamTransport::from_config(
        &redis_config,
        consumer_config.stream_key.clone(),
        consumer_config.max_length,
    )
    .await
    .wrap_err("Failed to connect to Redis")?;
    let transport = Arc::new(transport);
    info!("Connected to Redis successfully");

    Admin::from_config(transport.clone(), &consumer_config)
        .create_group()
        .await
        .wrap_err("Failed to create consumer group")?;

    // Set up a shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        let _ = shutdown_tx.send(true);
    });

    let notifier = EmailNotifier::new(LogEmailProvider);
    let pool = WorkerPool::from_transport(transport, notifier, consumer_config);

    let stats = pool
        .run(shutdown_rx)
        .await
        .wrap_err("Worker pool stopped on a stream error")?;

    info!(
        processed = stats.processed,
        succeeded = stats.succeeded,
        failed = stats.failed,
        dead_lettered = stats.dead_lettered,
        claimed = stats.claimed,
        "Email worker service stopped"
    );
    debug!(metrics = %metrics::render_metrics(), "Final metrics");

    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .wrap_err("Failed to install SIGTERM handler")?;

    #[cfg(unix)]
    let terminated = terminate.recv();

    #[cfg(not(unix))]
    let terminated = std::future::pending::<Option<()>>();

    tokio::select! {
        result = signal::ctrl_c() => {
            result.wrap_err("Failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminated => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
