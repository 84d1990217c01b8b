//! Kafka bindings
//!
//! One `StreamConsumer` is shared between the source (receive) and the
//! acknowledger (commit); auto-commit is off so offsets only move once a
//! message has been handled.

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, KafkaResult, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use stageline_core::dto::StageEvent;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::broker::offsets::OffsetTracker;
use crate::broker::{
    EventPublisher, InboundMessage, MessageAcknowledger, MessagePosition, MessageSource,
};
use crate::config::Config;
use crate::error::{Result, StageError};

/// Creates the group consumer and subscribes it to the stage topic
pub fn create_consumer(config: &Config) -> KafkaResult<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .set("group.id", &config.group_id)
        .set("client.id", &config.client_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .create()?;

    consumer.subscribe(&[config.topic.as_str()])?;
    Ok(consumer)
}

/// Creates the producer used for continuation events
pub fn create_producer(config: &Config) -> KafkaResult<FutureProducer> {
    ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .set("client.id", &config.client_id)
        .set(
            "message.timeout.ms",
            config.publish_timeout.as_millis().to_string(),
        )
        .create()
}

/// Checks that the brokers answer and the topic exists
///
/// Blocks the calling thread for up to `timeout`. Returns the partition
/// count.
pub fn check_topic(
    consumer: &StreamConsumer,
    topic: &str,
    timeout: Duration,
) -> KafkaResult<usize> {
    let metadata = consumer.fetch_metadata(Some(topic), timeout)?;
    let partitions = metadata
        .topics()
        .iter()
        .find(|t| t.name() == topic)
        .map_or(0, |t| t.partitions().len());

    debug!("Topic {} has {} partition(s)", topic, partitions);
    require_partitions(partitions)
}

/// A topic without partitions is reported as unknown
fn require_partitions(partitions: usize) -> KafkaResult<usize> {
    if partitions == 0 {
        return Err(KafkaError::MetadataFetch(
            RDKafkaErrorCode::UnknownTopicOrPartition,
        ));
    }
    Ok(partitions)
}

/// Pulls messages from the group consumer
pub struct KafkaSource {
    consumer: Arc<StreamConsumer>,
}

impl KafkaSource {
    pub fn new(consumer: Arc<StreamConsumer>) -> Self {
        Self { consumer }
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn next_message(&self) -> Result<InboundMessage> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| StageError::Receive(e.to_string()))?;

        Ok(InboundMessage {
            position: MessagePosition {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
            },
            payload: message.payload().map(<[u8]>::to_vec),
        })
    }
}

/// Commits handled messages for the consumer group
///
/// Commits go through an [`OffsetTracker`], so a message finishing early
/// never commits past an earlier one that is still running.
pub struct KafkaAcknowledger {
    consumer: Arc<StreamConsumer>,
    offsets: OffsetTracker,
}

impl KafkaAcknowledger {
    pub fn new(consumer: Arc<StreamConsumer>) -> Self {
        Self {
            consumer,
            offsets: OffsetTracker::default(),
        }
    }
}

#[async_trait]
impl MessageAcknowledger for KafkaAcknowledger {
    fn track(&self, position: &MessagePosition) {
        self.offsets.track(position);
    }

    async fn acknowledge(&self, position: &MessagePosition) -> Result<()> {
        let Some(offsets) = commit_after(&self.offsets, position)
            .map_err(|e| StageError::Acknowledge(e.to_string()))?
        else {
            debug!(
                partition = position.partition,
                offset = position.offset,
                "Commit held back by an earlier message in flight"
            );
            return Ok(());
        };

        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| StageError::Acknowledge(e.to_string()))
    }

    async fn flush(&self) -> Result<()> {
        let committed = self.offsets.committed();
        if committed.is_empty() {
            return Ok(());
        }

        let consumer = Arc::clone(&self.consumer);
        tokio::task::spawn_blocking(move || {
            let offsets = commit_list(&committed)?;
            consumer.commit(&offsets, CommitMode::Sync)
        })
        .await
        .map_err(|e| StageError::Acknowledge(e.to_string()))?
        .map_err(|e| StageError::Acknowledge(e.to_string()))
    }
}

/// Marks `position` done and builds the commit it unlocks, if any
fn commit_after(
    offsets: &OffsetTracker,
    position: &MessagePosition,
) -> KafkaResult<Option<TopicPartitionList>> {
    let Some(next) = offsets.complete(position) else {
        return Ok(None);
    };

    let commit = MessagePosition {
        offset: next,
        ..position.clone()
    };
    commit_list(std::slice::from_ref(&commit)).map(Some)
}

/// Builds the partition list for a commit
///
/// Each position holds the next offset to consume, not the last one handled.
fn commit_list(commits: &[MessagePosition]) -> KafkaResult<TopicPartitionList> {
    let mut list = TopicPartitionList::new();
    for commit in commits {
        list.add_partition_offset(&commit.topic, commit.partition, Offset::Offset(commit.offset))?;
    }
    Ok(list)
}

/// Publishes stage events to the stage topic
///
/// Events are keyed by run id so every stage of a run lands on the same
/// partition.
pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(producer: FutureProducer, topic: impl Into<String>, timeout: Duration) -> Self {
        Self {
            producer,
            topic: topic.into(),
            timeout,
        }
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, event: &StageEvent) -> Result<()> {
        let payload = event
            .to_vec()
            .map_err(|e| StageError::Publish(e.to_string()))?;

        let record = FutureRecord::to(&self.topic)
            .key(&event.run_id)
            .payload(&payload);

        self.producer
            .send(record, self.timeout)
            .await
            .map(|_| ())
            .map_err(|(e, _)| StageError::Publish(e.to_string()))
    }
}
