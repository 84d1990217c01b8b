//! Stage event DTO

use serde::{Deserialize, Serialize};

/// Broker message asking a worker to process one stage of a run
///
/// Wire format: `{"zapRunId": "<run id>", "stage": <zero-based index>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEvent {
    #[serde(rename = "zapRunId")]
    pub run_id: String,
    pub stage: u32,
}

impl StageEvent {
    pub fn new(run_id: impl Into<String>, stage: u32) -> Self {
        Self {
            run_id: run_id.into(),
            stage,
        }
    }

    /// Continuation event for the following stage of the same run
    pub fn next(&self) -> Self {
        Self {
            run_id: self.run_id.clone(),
            stage: self.stage + 1,
        }
    }

    /// Decodes an event from a raw message payload
    pub fn from_slice(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    /// Encodes the event as a message payload
    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
