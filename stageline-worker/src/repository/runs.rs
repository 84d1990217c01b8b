//! Runs repository
//!
//! Looks up pipeline runs and the actions of their pipeline:
//! - Resolving a run to its owning pipeline
//! - Listing a pipeline's actions (in no particular order)

use async_trait::async_trait;
use sqlx::PgPool;
use stageline_core::domain::{Action, ActionKind, PipelineRun};
use std::time::Duration;
use tracing::warn;

use crate::error::{Result, StageError};

/// Repository trait for run store lookups
///
/// Implementations must be safe to call from many stage tasks at once.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Fetches a run by its exact id, resolving the pipeline it belongs to
    ///
    /// Fails with `NotFound` for an unknown id and `StoreUnavailable` on
    /// connectivity problems or when the deadline elapses.
    async fn find_run(&self, run_id: &str) -> Result<PipelineRun>;

    /// Lists every action of a pipeline
    ///
    /// Result order is unspecified; callers must use each action's position.
    /// A pipeline without actions yields an empty list.
    async fn list_actions(&self, pipeline_id: &str) -> Result<Vec<Action>>;
}

const FIND_RUN: &str = r#"
    SELECT id::text AS id, "zapId"::text AS pipeline_id, metadata::text AS metadata
    FROM "ZapRun"
    WHERE id::text = $1
"#;

const LIST_ACTIONS: &str = r#"
    SELECT id::text AS id, "zapId"::text AS pipeline_id, "actionId"::text AS kind,
           "sortingOrder" AS position, metadata::text AS metadata
    FROM "Action"
    WHERE "zapId"::text = $1
"#;

/// PostgreSQL implementation of RunRepository
pub struct PgRunRepository {
    pool: PgPool,
    timeout: Duration,
}

impl PgRunRepository {
    /// Creates a new repository over a shared pool
    ///
    /// # Arguments
    /// * `pool` - Connection pool shared by all stage tasks
    /// * `timeout` - Deadline applied to every query
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl RunRepository for PgRunRepository {
    async fn find_run(&self, run_id: &str) -> Result<PipelineRun> {
        let row = tokio::time::timeout(
            self.timeout,
            sqlx::query_as::<_, RunRow>(FIND_RUN)
                .bind(run_id)
                .fetch_optional(&self.pool),
        )
        .await??;

        row.map(PipelineRun::from)
            .ok_or_else(|| StageError::NotFound(run_id.to_string()))
    }

    async fn list_actions(&self, pipeline_id: &str) -> Result<Vec<Action>> {
        let rows = tokio::time::timeout(
            self.timeout,
            sqlx::query_as::<_, ActionRow>(LIST_ACTIONS)
                .bind(pipeline_id)
                .fetch_all(&self.pool),
        )
        .await??;

        Ok(rows.into_iter().map(Action::from).collect())
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    pipeline_id: String,
    metadata: Option<String>,
}

impl From<RunRow> for PipelineRun {
    fn from(row: RunRow) -> Self {
        let metadata = match row.metadata.as_deref() {
            None => serde_json::Value::Null,
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
                warn!(run_id = %row.id, "Run metadata is not valid JSON: {}", e);
                serde_json::Value::Null
            }),
        };

        PipelineRun {
            id: row.id,
            pipeline_id: row.pipeline_id,
            metadata,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ActionRow {
    id: String,
    pipeline_id: String,
    kind: String,
    position: i32,
    metadata: Option<String>,
}

impl From<ActionRow> for Action {
    fn from(row: ActionRow) -> Self {
        Action {
            id: row.id,
            pipeline_id: row.pipeline_id,
            kind: ActionKind::new(row.kind),
            metadata: row.metadata.unwrap_or_else(|| "{}".to_string()),
            position: row.position,
        }
    }
}
