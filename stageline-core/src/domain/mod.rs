//! Core domain types
//!
//! These types mirror the records owned by the authoring service. The worker
//! only ever reads them; runs, pipelines and actions are never mutated here.

pub mod pipeline;
pub mod run;

pub use pipeline::{Action, ActionKind, Pipeline};
pub use run::PipelineRun;
