//! Event channel
//!
//! Handles one consumed message end to end: decode, process the stage,
//! publish the continuation, acknowledge. The acknowledgement always comes
//! last, so a crash mid-way leads to redelivery instead of a lost stage.

use stageline_core::dto::StageEvent;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::broker::{EventPublisher, InboundMessage, MessageAcknowledger};
use crate::error::{Result, StageError};
use crate::service::StageProcessor;

/// What happened to a message
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HandleReport {
    /// Decoded event, if the payload was valid
    pub event: Option<StageEvent>,
    /// The run had stages left after this one
    pub advanced: bool,
    /// The continuation event was enqueued
    pub published: bool,
    /// The message was committed
    pub acknowledged: bool,
}

/// Glue between the broker and the stage processor
pub struct EventChannel {
    processor: Arc<StageProcessor>,
    publisher: Arc<dyn EventPublisher>,
    acknowledger: Arc<dyn MessageAcknowledger>,
}

impl EventChannel {
    pub fn new(
        processor: Arc<StageProcessor>,
        publisher: Arc<dyn EventPublisher>,
        acknowledger: Arc<dyn MessageAcknowledger>,
    ) -> Self {
        Self {
            processor,
            publisher,
            acknowledger,
        }
    }

    /// Registers a message with the acknowledger before it is handled
    pub fn track(&self, message: &InboundMessage) {
        self.acknowledger.track(&message.position);
    }

    /// Commits everything acknowledged so far, waiting for the broker
    pub async fn flush(&self) -> Result<()> {
        self.acknowledger.flush().await
    }

    /// Handles a single consumed message
    ///
    /// Never fails: every error is logged and the message is acknowledged,
    /// including store outages, which therefore are not retried.
    pub async fn handle(&self, message: InboundMessage) -> HandleReport {
        let started = Instant::now();
        let position = &message.position;
        let mut report = HandleReport::default();

        debug!(
            partition = position.partition,
            offset = position.offset,
            "Received message"
        );

        match decode(message.payload.as_deref()) {
            Ok(event) => {
                self.advance(&event, &mut report).await;
                report.event = Some(event);
            }
            Err(e) => {
                warn!(
                    partition = position.partition,
                    offset = position.offset,
                    "Dropping message: {}",
                    e
                );
            }
        }

        match self.acknowledger.acknowledge(position).await {
            Ok(()) => report.acknowledged = true,
            Err(e) => error!(
                partition = position.partition,
                offset = position.offset,
                "{}",
                e
            ),
        }

        info!(
            partition = position.partition,
            offset = position.offset,
            "Time taken to process message: {:?}",
            started.elapsed()
        );

        report
    }

    /// Processes the stage and publishes its continuation when needed
    async fn advance(&self, event: &StageEvent, report: &mut HandleReport) {
        let run_id = event.run_id.as_str();
        let stage = event.stage;

        let outcome = match self.processor.process_stage(run_id, stage).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_retryable() {
                    // Acknowledged anyway: the event is not redelivered
                    error!(run_id, stage, "Stage processing failed, dropping event: {}", e);
                } else {
                    warn!(run_id, stage, "Stage processing failed: {}", e);
                }
                return;
            }
        };

        if outcome.failures.is_empty() {
            debug!(run_id, stage, executed = outcome.executed, "Stage processed");
        } else {
            warn!(
                run_id,
                stage,
                executed = outcome.executed,
                "{} action(s) failed at this stage",
                outcome.failures.len()
            );
        }

        report.advanced = outcome.advanced;
        if !outcome.advanced {
            info!(run_id, stage, "Run reached its last stage");
            return;
        }

        let next = event.next();
        info!(run_id, stage = next.stage, "Pushing next stage to the queue");
        match self.publisher.publish(&next).await {
            Ok(()) => report.published = true,
            Err(e) => error!(run_id, stage = next.stage, "{}", e),
        }
    }
}

/// Decodes a raw payload into a stage event
fn decode(payload: Option<&[u8]>) -> Result<StageEvent> {
    let payload = match payload {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => return Err(StageError::Decode("empty payload".to_string())),
    };

    let event = StageEvent::from_slice(payload).map_err(|e| StageError::Decode(e.to_string()))?;

    if event.run_id.trim().is_empty() {
        return Err(StageError::Decode("run id is empty".to_string()));
    }

    Ok(event)
}
