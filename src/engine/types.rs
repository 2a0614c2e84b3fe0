use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Identity of a running workflow, available to workflow code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInfo {
    pub workflow_id: String,
    pub run_id: Uuid,
    pub workflow_type: String,
    pub task_queue: String,
    pub namespace: String,
    pub started_at: DateTime<Utc>,
}

/// Identity of a running activity, available to activity code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityInfo {
    pub activity_id: String,
    pub activity_type: String,
    pub workflow_id: String,
    pub workflow_run_id: Uuid,
    pub task_queue: String,
    pub attempt: u32,
    pub scheduled_at: DateTime<Utc>,
}

/// Options for starting a workflow.
#[derive(Debug, Clone, Default)]
pub struct StartWorkflowOptions {
    /// Business identifier of the workflow. A random id is used when unset.
    pub id: Option<String>,
    /// Queue the workflow is dispatched to. The client's default queue is
    /// used when unset.
    pub task_queue: Option<String>,
}

impl StartWorkflowOptions {
    pub fn new(id: impl Into<String>, task_queue: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            task_queue: Some(task_queue.into()),
        }
    }
}

/// Options applied to activities scheduled from a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityOptions {
    /// Maximum time a single activity execution may take.
    pub start_to_close_timeout: Duration,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close_timeout: Duration::from_secs(60),
        }
    }
}

/// Configuration for a worker.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Maximum number of workflow tasks executing at once. Defaults to 10.
    pub max_concurrent_workflow_tasks: usize,

    /// Maximum number of activities executing at once. Defaults to 20.
    pub max_concurrent_activity_tasks: usize,

    /// How long [`WorkerHandle::shutdown`](super::WorkerHandle::shutdown)
    /// waits for in-flight tasks. Defaults to 5 seconds.
    pub shutdown_timeout: Duration,

    /// Worker identity reported in logs. Defaults to `hostname:pid`.
    pub identity: Option<String>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            max_concurrent_workflow_tasks: 10,
            max_concurrent_activity_tasks: 20,
            shutdown_timeout: Duration::from_secs(5),
            identity: None,
        }
    }
}
