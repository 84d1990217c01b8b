//! Action executor
//!
//! Dispatches an action to the handler registered for its kind. Kinds
//! without a handler are skipped rather than failed, so the authoring
//! service can introduce kinds before a worker knows how to run them.

use async_trait::async_trait;
use serde::Deserialize;
use stageline_core::domain::{Action, ActionKind, PipelineRun};
use stageline_core::template;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, StageError};
use crate::service::mail::MailTransport;

/// Handler for one action kind
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Performs the action's side effect
    ///
    /// # Arguments
    /// * `action` - The action to perform, including its raw metadata
    /// * `run` - The run being advanced; its metadata feeds templates
    async fn handle(&self, action: &Action, run: &PipelineRun) -> Result<()>;
}

/// What the executor did with an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A handler ran and succeeded
    Handled,
    /// No handler is registered for the action's kind
    Skipped,
}

/// Registry mapping action kinds to handlers
#[derive(Default)]
pub struct ActionExecutor {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl ActionExecutor {
    /// Creates an executor with no handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor with the built-in `email` handler
    pub fn with_email(transport: Arc<dyn MailTransport>) -> Self {
        let mut executor = Self::new();
        executor.register(ActionKind::email(), Arc::new(EmailHandler::new(transport)));
        executor
    }

    /// Registers (or replaces) the handler for a kind
    pub fn register(&mut self, kind: ActionKind, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// Kinds with a registered handler
    pub fn kinds(&self) -> impl Iterator<Item = &ActionKind> {
        self.handlers.keys()
    }

    /// Executes an action through its kind's handler
    pub async fn execute(&self, action: &Action, run: &PipelineRun) -> Result<Dispatch> {
        let Some(handler) = self.handlers.get(&action.kind) else {
            debug!(
                action_id = %action.id,
                kind = %action.kind,
                "No handler registered, skipping action"
            );
            return Ok(Dispatch::Skipped);
        };

        handler.handle(action, run).await?;
        Ok(Dispatch::Handled)
    }
}

/// Email action metadata
///
/// Older pipelines store the recipient under `email`.
#[derive(Debug, Deserialize)]
struct EmailPayload {
    #[serde(alias = "email")]
    recipient: String,
    body: String,
}

impl EmailPayload {
    fn decode(action: &Action) -> Result<Self> {
        let payload: EmailPayload = serde_json::from_str(&action.metadata)
            .map_err(|e| StageError::malformed_metadata(&action.id, e))?;

        if payload.recipient.trim().is_empty() {
            return Err(StageError::malformed_metadata(
                &action.id,
                "recipient is empty",
            ));
        }

        Ok(payload)
    }
}

/// Sends the action's templated body to its templated recipient
pub struct EmailHandler {
    transport: Arc<dyn MailTransport>,
}

impl EmailHandler {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ActionHandler for EmailHandler {
    async fn handle(&self, action: &Action, run: &PipelineRun) -> Result<()> {
        let payload = EmailPayload::decode(action)?;

        let recipient = template::render(&payload.recipient, &run.metadata);
        if recipient.trim().is_empty() {
            return Err(StageError::malformed_metadata(
                &action.id,
                "recipient is empty after rendering",
            ));
        }
        let body = template::render(&payload.body, &run.metadata);

        info!(run_id = %run.id, action_id = %action.id, "Sending email to {}", recipient);
        self.transport.send(&recipient, &body).await
    }
}
