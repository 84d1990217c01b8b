//! Stage processor
//!
//! Executes the action(s) scheduled at one stage of a run and decides
//! whether the run has stages left. Holds no state of its own: the outcome
//! is a function of the store contents, so redelivered events produce the
//! same advance decision.

use stageline_core::domain::pipeline::{actions_at, max_position};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, StageError};
use crate::repository::RunRepository;
use crate::service::executor::{ActionExecutor, Dispatch};

/// Result of processing one stage
#[derive(Debug, Default)]
pub struct StageOutcome {
    /// A continuation event for `stage + 1` should be published
    pub advanced: bool,
    /// Number of actions whose handler ran successfully
    pub executed: usize,
    /// Handler failures; recorded, never escalated
    pub failures: Vec<StageError>,
}

/// Runs the actions of a stage and computes the advance decision
pub struct StageProcessor {
    runs: Arc<dyn RunRepository>,
    executor: Arc<ActionExecutor>,
}

impl StageProcessor {
    pub fn new(runs: Arc<dyn RunRepository>, executor: Arc<ActionExecutor>) -> Self {
        Self { runs, executor }
    }

    /// Processes stage `stage` of run `run_id`
    ///
    /// Store failures (`NotFound`, `StoreUnavailable`) are returned. Handler
    /// failures are collected in the outcome and do not stop sibling
    /// actions at the same position, nor the advance decision.
    pub async fn process_stage(&self, run_id: &str, stage: u32) -> Result<StageOutcome> {
        let run = self.runs.find_run(run_id).await?;
        let actions = self.runs.list_actions(&run.pipeline_id).await?;

        debug!(
            run_id,
            stage,
            pipeline_id = %run.pipeline_id,
            "Loaded {} action(s)",
            actions.len()
        );

        let mut outcome = StageOutcome::default();
        let mut matched = 0;

        for action in actions_at(&actions, stage) {
            matched += 1;
            match self.executor.execute(action, &run).await {
                Ok(Dispatch::Handled) => outcome.executed += 1,
                Ok(Dispatch::Skipped) => {}
                Err(e) => {
                    warn!(run_id, stage, action_id = %action.id, "Action failed: {}", e);
                    outcome.failures.push(e);
                }
            }
        }

        if matched == 0 {
            info!(run_id, stage, "No action at this stage");
        }

        // Positions may be sparse; compare against the highest one, not the count
        outcome.advanced =
            max_position(&actions).is_some_and(|max| i64::from(stage) < i64::from(max));

        Ok(outcome)
    }
}
