use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while converting values to and from engine payloads.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("unsupported payload encoding `{0}`")]
    UnsupportedEncoding(String),
}

/// Serializable description of a workflow or activity failure.
///
/// This is what travels back from the worker to the caller; the error value
/// itself stays on the worker side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Error type name (e.g. "ActivityFailed", "WorkflowNotRegistered")
    pub name: String,
    /// Human-readable error message
    pub message: String,
}

impl FailureInfo {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by the engine client, the worker harness and workflow contexts.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid engine configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("context propagation failed: {0}")]
    Propagation(#[source] PayloadError),

    #[error("task queue `{0}` is closed")]
    QueueClosed(String),

    #[error("workflow `{workflow_id}` failed: {}", failure.message)]
    WorkflowFailed {
        workflow_id: String,
        failure: FailureInfo,
    },

    #[error("activity `{activity_type}` failed: {}", failure.message)]
    ActivityFailed {
        activity_type: String,
        failure: FailureInfo,
    },

    #[error("activity `{activity_type}` did not complete within {timeout:?}")]
    ActivityTimeout {
        activity_type: String,
        timeout: Duration,
    },

    #[error("no result was delivered for `{0}`; the worker dropped it")]
    ResultLost(String),
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Error type returned by workflow and activity bodies.
///
/// Engine errors (a failed activity, a payload that would not decode) keep
/// their type so the worker can report them precisely; everything else is an
/// `anyhow::Error`.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Result type alias for workflow and activity bodies.
pub type TaskResult<T> = Result<T, TaskError>;

impl From<PayloadError> for TaskError {
    fn from(err: PayloadError) -> Self {
        TaskError::Engine(err.into())
    }
}

/// Convert a task error into the failure record sent back to the caller.
pub fn serialize_error(err: &TaskError) -> FailureInfo {
    let name = match err {
        TaskError::Engine(EngineError::ActivityFailed { .. }) => "ActivityFailed",
        TaskError::Engine(EngineError::ActivityTimeout { .. }) => "ActivityTimeout",
        TaskError::Engine(EngineError::Payload(_)) => "PayloadError",
        TaskError::Engine(_) => "EngineError",
        TaskError::Failed(_) => "Error",
    };
    FailureInfo::new(name, err.to_string())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn test_serialize_error_keeps_engine_kind() {
        let err = TaskError::Engine(EngineError::ActivityTimeout {
            activity_type: "HelloWorldActivity".to_string(),
            timeout: Duration::from_secs(1),
        });
        let failure = serialize_error(&err);
        assert_eq!(failure.name, "ActivityTimeout");
        assert!(failure.message.contains("HelloWorldActivity"));
    }

    #[test]
    fn test_serialize_error_generic() {
        let err = TaskError::Failed(anyhow::anyhow!("boom"));
        assert_eq!(serialize_error(&err), FailureInfo::new("Error", "boom"));
    }
}
