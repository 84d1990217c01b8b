//! Stageline Worker
//!
//! A stateless worker that advances pipeline runs one stage at a time.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Repository: Read-only lookups of runs and actions in the run store
//! - Services: Action dispatch (email, ...) and stage processing
//! - Broker: Kafka consumption, continuation publishing, offset commits
//! - Scheduler: Bounded pull loop with graceful shutdown
//!
//! Each consumed stage event runs the action(s) at that stage, publishes an
//! event for the next stage when the pipeline has more, and commits the
//! consumed offset only after that work is done.

mod broker;
mod config;
mod db;
mod error;
mod repository;
mod scheduler;
mod service;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::broker::kafka;
use crate::broker::{EventChannel, KafkaAcknowledger, KafkaPublisher, KafkaSource};
use crate::config::Config;
use crate::repository::{PgRunRepository, RunRepository};
use crate::scheduler::Dispatcher;
use crate::service::{
    ActionExecutor, HttpMailTransport, LogMailTransport, MailTransport, StageProcessor,
};

/// How long startup waits for the brokers to answer
const BROKER_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stageline_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Stageline Worker");

    // Load configuration
    let config = load_config()?;
    info!(
        "Loaded configuration: brokers={}, topic={}, group_id={}",
        config.brokers, config.topic, config.group_id
    );

    // Connect to the run store
    let pool = db::create_pool(
        &config.database_url,
        config.database_max_connections,
        config.store_timeout,
    )
    .await
    .context("Failed to connect to the run store")?;
    info!("Run store connection pool created");

    let runs: Arc<dyn RunRepository> =
        Arc::new(PgRunRepository::new(pool, config.store_timeout));

    // Register action handlers
    let transport: Arc<dyn MailTransport> = match &config.mail_relay_url {
        Some(url) => {
            info!("Delivering email through relay {}", url);
            Arc::new(HttpMailTransport::new(url.clone()))
        }
        None => {
            info!("No mail relay configured, emails will only be logged");
            Arc::new(LogMailTransport)
        }
    };

    let executor = ActionExecutor::with_email(transport);
    info!("Registered {} action kind(s)", executor.kinds().count());
    for kind in executor.kinds() {
        info!("  - {}", kind);
    }

    let processor = Arc::new(StageProcessor::new(runs, Arc::new(executor)));

    // Connect to the broker
    let consumer =
        Arc::new(kafka::create_consumer(&config).context("Failed to create Kafka consumer")?);

    let check_consumer = Arc::clone(&consumer);
    let check_topic = config.topic.clone();
    let partitions = tokio::task::spawn_blocking(move || {
        kafka::check_topic(&check_consumer, &check_topic, BROKER_CHECK_TIMEOUT)
    })
    .await
    .context("Broker check task failed")?
    .with_context(|| format!("Topic {} is not available", config.topic))?;
    info!(
        "Subscribed to topic: {} ({} partition(s))",
        config.topic, partitions
    );

    let producer = kafka::create_producer(&config).context("Failed to create Kafka producer")?;

    let channel = Arc::new(EventChannel::new(
        processor,
        Arc::new(KafkaPublisher::new(
            producer,
            config.topic.clone(),
            config.publish_timeout,
        )),
        Arc::new(KafkaAcknowledger::new(Arc::clone(&consumer))),
    ));

    let dispatcher = Dispatcher::new(
        Arc::new(KafkaSource::new(consumer)),
        channel,
        config.max_in_flight,
        config.shutdown_grace,
    );

    info!("Worker initialized successfully");

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    // Drains in-flight messages and commits their offsets synchronously
    let dispatched = dispatcher.run(cancel).await;
    info!("Worker stopped after dispatching {} message(s)", dispatched);

    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    let config = Config::from_env();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Cancels `cancel` on SIGINT or SIGTERM
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
    cancel.cancel();
}
