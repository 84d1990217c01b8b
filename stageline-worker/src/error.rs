//! Error types for stage processing
//!
//! Every failure the worker can hit while handling a message. None of these
//! terminate the process; they are logged and the message is acknowledged.

use thiserror::Error;

/// Result type alias for stage processing
pub type Result<T> = std::result::Result<T, StageError>;

/// Errors that can occur while processing a stage event
#[derive(Debug, Error)]
pub enum StageError {
    /// Message payload is not a valid stage event
    #[error("malformed stage event: {0}")]
    Decode(String),

    /// The event references a run the store does not know
    #[error("pipeline run not found: {0}")]
    NotFound(String),

    /// Store connectivity failure or deadline exceeded
    #[error("run store unavailable: {0}")]
    StoreUnavailable(String),

    /// Action metadata could not be decoded for its handler
    #[error("malformed metadata for action {action_id}: {reason}")]
    MalformedMetadata {
        /// Action whose metadata was rejected
        action_id: String,
        /// Why decoding failed
        reason: String,
    },

    /// Continuation event could not be enqueued
    #[error("failed to publish stage event: {0}")]
    Publish(String),

    /// Consumed message could not be committed
    #[error("failed to acknowledge message: {0}")]
    Acknowledge(String),

    /// Broker receive failure
    #[error("failed to receive message: {0}")]
    Receive(String),

    /// Mail transport rejected or failed the delivery
    #[error("mail transport failed: {0}")]
    Transport(String),
}

impl StageError {
    pub fn malformed_metadata(action_id: impl Into<String>, reason: impl ToString) -> Self {
        StageError::MalformedMetadata {
            action_id: action_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether redelivering the same message could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StageError::StoreUnavailable(_)
                | StageError::Publish(_)
                | StageError::Acknowledge(_)
                | StageError::Receive(_)
                | StageError::Transport(_)
        )
    }
}

impl From<sqlx::Error> for StageError {
    fn from(err: sqlx::Error) -> Self {
        StageError::StoreUnavailable(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for StageError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        StageError::StoreUnavailable("store deadline exceeded".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StageError::StoreUnavailable("down".into()).is_retryable());
        assert!(StageError::Publish("queue full".into()).is_retryable());
        assert!(!StageError::Decode("bad".into()).is_retryable());
        assert!(!StageError::NotFound("run-1".into()).is_retryable());
        assert!(!StageError::malformed_metadata("a1", "missing field").is_retryable());
    }

    #[test]
    fn test_sqlx_error_maps_to_store_unavailable() {
        let err: StageError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StageError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_elapsed_deadline_maps_to_store_unavailable() {
        let elapsed = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();

        let err = StageError::from(elapsed);
        assert!(matches!(err, StageError::StoreUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_malformed_metadata_display() {
        let err = StageError::malformed_metadata("a1", "missing field `body`");
        assert_eq!(
            err.to_string(),
            "malformed metadata for action a1: missing field `body`"
        );
    }
}
