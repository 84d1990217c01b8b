//! Repository layer
//!
//! Read-only access to the run store. The schema belongs to the authoring
//! service; the worker only looks up runs and their pipeline's actions.
//!
//! Repositories are trait-based to enable testing and mocking.

mod runs;

pub use runs::{PgRunRepository, RunRepository};
