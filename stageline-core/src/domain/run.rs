//! Pipeline run domain types

use serde::{Deserialize, Serialize};

/// One execution instance of a pipeline
///
/// Created by the authoring service when a trigger fires. `metadata` holds
/// the trigger payload and is what action templates are rendered against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: String,
    pub pipeline_id: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}
