//! Service layer
//!
//! Business logic of the worker: running the action at a stage and deciding
//! whether the run advances.
//!
//! Side-effecting collaborators (handlers, mail transports) are trait-based
//! to enable testing and dependency injection.

pub mod executor;
pub mod mail;
pub mod stage;

pub use executor::ActionExecutor;
pub use mail::{HttpMailTransport, LogMailTransport, MailTransport};
pub use stage::StageProcessor;
