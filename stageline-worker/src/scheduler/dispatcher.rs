//! Message dispatcher
//!
//! Pulls messages one at a time and hands each to its own task. The pull
//! loop never waits for a task to finish, only for a free in-flight slot,
//! which bounds concurrent work and applies backpressure to the consumer.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::{EventChannel, InboundMessage, MessageSource};

/// Pause after a failed receive before pulling again
const RECEIVE_BACKOFF: Duration = Duration::from_secs(1);

/// Pull loop feeding stage tasks
pub struct Dispatcher {
    source: Arc<dyn MessageSource>,
    channel: Arc<EventChannel>,
    semaphore: Arc<Semaphore>,
    max_in_flight: usize,
    shutdown_grace: Duration,
}

impl Dispatcher {
    /// Creates a new dispatcher
    ///
    /// # Arguments
    /// * `source` - Where messages are pulled from
    /// * `channel` - Handles each message
    /// * `max_in_flight` - Maximum messages processed at once
    /// * `shutdown_grace` - How long shutdown waits for in-flight messages
    pub fn new(
        source: Arc<dyn MessageSource>,
        channel: Arc<EventChannel>,
        max_in_flight: usize,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            source,
            channel,
            semaphore: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            shutdown_grace,
        }
    }

    /// Number of messages currently being handled
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.semaphore.available_permits()
    }

    /// Runs the pull loop until `cancel` fires, then drains in-flight work
    ///
    /// Returns the number of messages dispatched.
    pub async fn run(&self, cancel: CancellationToken) -> usize {
        info!(
            "Starting dispatcher (max in flight: {})",
            self.max_in_flight
        );

        let mut dispatched = 0;

        loop {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = self.source.next_message() => received,
            };

            match received {
                Ok(message) => {
                    self.spawn_handler(message, permit);
                    dispatched += 1;
                }
                Err(e) => {
                    drop(permit);
                    error!("{}", e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = time::sleep(RECEIVE_BACKOFF) => {}
                    }
                }
            }
        }

        info!(
            "Stopped pulling after {} message(s), waiting for {} in flight",
            dispatched,
            self.in_flight()
        );
        self.drain().await;

        match self.channel.flush().await {
            Ok(()) => info!("Final offsets committed"),
            Err(e) => error!("Final commit failed: {}", e),
        }

        dispatched
    }

    /// Spawns the task handling one message
    ///
    /// The permit is released when the task ends, panics included.
    fn spawn_handler(&self, message: InboundMessage, permit: OwnedSemaphorePermit) {
        let channel = Arc::clone(&self.channel);
        channel.track(&message);

        tokio::spawn(async move {
            let report = channel.handle(message).await;
            debug!(
                run_id = report.event.as_ref().map(|e| e.run_id.as_str()),
                advanced = report.advanced,
                published = report.published,
                acknowledged = report.acknowledged,
                "Message handled"
            );
            drop(permit);
        });
    }

    /// Waits for every in-flight task, bounded by the shutdown grace
    async fn drain(&self) {
        let all = u32::try_from(self.max_in_flight).unwrap_or(u32::MAX);

        match time::timeout(self.shutdown_grace, self.semaphore.acquire_many(all)).await {
            Ok(Ok(_permits)) => info!("All in-flight messages finished"),
            Ok(Err(_)) => warn!("Dispatcher semaphore closed during shutdown"),
            Err(_) => warn!(
                "Shutdown grace elapsed with {} message(s) still in flight",
                self.in_flight()
            ),
        }
    }
}
