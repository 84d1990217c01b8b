//! Data Transfer Objects for inter-service communication
//!
//! Messages exchanged over the broker between the authoring service (which
//! starts runs) and the worker (which advances them).

pub mod stage;

pub use stage::StageEvent;
