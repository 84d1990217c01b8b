//! Scheduler layer for the worker
//!
//! Pulls stage events off the broker and runs each one in its own task,
//! with a bound on how many are in flight and a graceful drain on shutdown.

pub mod dispatcher;

pub use dispatcher::Dispatcher;
