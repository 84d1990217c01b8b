//! Broker layer
//!
//! Consumes stage events, publishes continuations, and commits consumed
//! offsets. The seams are traits so the channel and dispatcher can be
//! exercised without a running broker; `kafka` holds the real bindings.

pub mod channel;
pub mod kafka;
pub mod offsets;

use async_trait::async_trait;
use stageline_core::dto::StageEvent;

use crate::error::Result;

pub use channel::EventChannel;
pub use kafka::{KafkaAcknowledger, KafkaPublisher, KafkaSource};

/// Where a consumed message sits in the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePosition {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// A consumed message, detached from the consumer
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub position: MessagePosition,
    pub payload: Option<Vec<u8>>,
}

/// Source of raw messages, pulled one at a time
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Waits for the next message
    async fn next_message(&self) -> Result<InboundMessage>;
}

/// Publishes stage events onto the topic
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &StageEvent) -> Result<()>;
}

/// Commits consumed messages for the consumer group
#[async_trait]
pub trait MessageAcknowledger: Send + Sync {
    /// Notes that the message at `position` was handed out for processing
    fn track(&self, _position: &MessagePosition) {}

    /// Marks the message at `position` as processed
    ///
    /// A commit never covers a tracked message that is still being
    /// processed.
    async fn acknowledge(&self, position: &MessagePosition) -> Result<()>;

    /// Synchronously commits whatever has been acknowledged so far
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
