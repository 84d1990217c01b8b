//! In-memory collaborators for unit tests

use async_trait::async_trait;
use stageline_core::domain::{Action, ActionKind, PipelineRun};
use stageline_core::dto::StageEvent;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::broker::offsets::OffsetTracker;
use crate::broker::{
    EventPublisher, InboundMessage, MessageAcknowledger, MessagePosition, MessageSource,
};
use crate::error::{Result, StageError};
use crate::repository::RunRepository;
use crate::service::MailTransport;

pub fn run(id: &str, pipeline_id: &str) -> PipelineRun {
    PipelineRun {
        id: id.to_string(),
        pipeline_id: pipeline_id.to_string(),
        metadata: serde_json::Value::Null,
    }
}

/// The owning pipeline is filled in by `FakeRunStore::with_action`
pub fn action(id: &str, kind: &str, position: i32, metadata: &str) -> Action {
    Action {
        id: id.to_string(),
        pipeline_id: String::new(),
        kind: ActionKind::new(kind),
        metadata: metadata.to_string(),
        position,
    }
}

pub fn email_action(id: &str, position: i32, recipient: &str, body: &str) -> Action {
    let metadata = serde_json::json!({"recipient": recipient, "body": body}).to_string();
    action(id, ActionKind::EMAIL, position, &metadata)
}

pub fn message(offset: i64, payload: &str) -> InboundMessage {
    InboundMessage {
        position: MessagePosition {
            topic: "zap-events".to_string(),
            partition: 0,
            offset,
        },
        payload: Some(payload.as_bytes().to_vec()),
    }
}

/// Polls `condition` until it holds, failing the test after five seconds
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Counts concurrent lookups against a `FakeRunStore`
#[derive(Debug, Default)]
pub struct StoreGauge {
    active: AtomicUsize,
    peak: AtomicUsize,
    entered: AtomicUsize,
}

impl StoreGauge {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }
}

/// Run store backed by maps
///
/// Actions added with `with_action` belong to the pipeline of the most
/// recently added run.
#[derive(Default)]
pub struct FakeRunStore {
    runs: HashMap<String, PipelineRun>,
    actions: HashMap<String, Vec<Action>>,
    current_pipeline: String,
    unavailable: bool,
    delay: Duration,
    run_delays: HashMap<String, Duration>,
    gauge: Arc<StoreGauge>,
}

impl FakeRunStore {
    pub fn with_run(mut self, run_id: &str, pipeline_id: &str) -> Self {
        self.runs.insert(run_id.to_string(), run(run_id, pipeline_id));
        self.actions.entry(pipeline_id.to_string()).or_default();
        self.current_pipeline = pipeline_id.to_string();
        self
    }

    pub fn with_action(mut self, mut action: Action) -> Self {
        action.pipeline_id = self.current_pipeline.clone();
        self.actions
            .entry(self.current_pipeline.clone())
            .or_default()
            .push(action);
        self
    }

    /// Every lookup fails as if the store were unreachable
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Every run lookup takes `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Lookups of `run_id` take `delay`, overriding `with_delay`
    pub fn with_run_delay(mut self, run_id: &str, delay: Duration) -> Self {
        self.run_delays.insert(run_id.to_string(), delay);
        self
    }

    pub fn gauge(&self) -> Arc<StoreGauge> {
        Arc::clone(&self.gauge)
    }
}

#[async_trait]
impl RunRepository for FakeRunStore {
    async fn find_run(&self, run_id: &str) -> Result<PipelineRun> {
        let gauge = &self.gauge;
        gauge.entered.fetch_add(1, Ordering::SeqCst);
        let active = gauge.active.fetch_add(1, Ordering::SeqCst) + 1;
        gauge.peak.fetch_max(active, Ordering::SeqCst);

        let delay = self.run_delays.get(run_id).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        gauge.active.fetch_sub(1, Ordering::SeqCst);

        if self.unavailable {
            return Err(StageError::StoreUnavailable("connection refused".to_string()));
        }

        self.runs
            .get(run_id)
            .cloned()
            .ok_or_else(|| StageError::NotFound(run_id.to_string()))
    }

    async fn list_actions(&self, pipeline_id: &str) -> Result<Vec<Action>> {
        if self.unavailable {
            return Err(StageError::StoreUnavailable("connection refused".to_string()));
        }

        Ok(self.actions.get(pipeline_id).cloned().unwrap_or_default())
    }
}

/// Mail transport remembering every delivery
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, recipient: &str, body: &str) -> Result<()> {
        if self.fail {
            return Err(StageError::Transport("smtp rejected".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), body.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<StageEvent>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn published(&self) -> Vec<StageEvent> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &StageEvent) -> Result<()> {
        if self.fail {
            return Err(StageError::Publish("broker unreachable".to_string()));
        }
        self.published.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAcknowledger {
    acked: Mutex<Vec<MessagePosition>>,
}

impl RecordingAcknowledger {
    pub fn acked(&self) -> Vec<MessagePosition> {
        self.acked.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageAcknowledger for RecordingAcknowledger {
    async fn acknowledge(&self, position: &MessagePosition) -> Result<()> {
        self.acked.lock().unwrap().push(position.clone());
        Ok(())
    }
}

/// What a `WatermarkAcknowledger` saw, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckEvent {
    Done(i64),
    Commit(i64),
    Flush,
}

/// Acknowledger committing through an `OffsetTracker` into a log
#[derive(Default)]
pub struct WatermarkAcknowledger {
    offsets: OffsetTracker,
    events: Mutex<Vec<AckEvent>>,
}

impl WatermarkAcknowledger {
    pub fn events(&self) -> Vec<AckEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageAcknowledger for WatermarkAcknowledger {
    fn track(&self, position: &MessagePosition) {
        self.offsets.track(position);
    }

    async fn acknowledge(&self, position: &MessagePosition) -> Result<()> {
        let mut events = self.events.lock().unwrap();
        events.push(AckEvent::Done(position.offset));
        if let Some(next) = self.offsets.complete(position) {
            events.push(AckEvent::Commit(next));
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.events.lock().unwrap().push(AckEvent::Flush);
        Ok(())
    }
}

/// Source replaying queued results, then waiting forever
#[derive(Default)]
pub struct QueueSource {
    queue: Mutex<VecDeque<Result<InboundMessage>>>,
}

impl QueueSource {
    pub fn new(items: impl IntoIterator<Item = Result<InboundMessage>>) -> Self {
        Self {
            queue: Mutex::new(items.into_iter().collect()),
        }
    }
}

#[async_trait]
impl MessageSource for QueueSource {
    async fn next_message(&self) -> Result<InboundMessage> {
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(item) => item,
            None => std::future::pending().await,
        }
    }
}
