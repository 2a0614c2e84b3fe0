//! In-process engine binding.
//!
//! Task queues are unbounded channels shared by every client and worker
//! created from the same [`LocalEngine`]. Results travel back on per-task
//! oneshot channels. Nothing is persisted: a task that is dequeued by a
//! worker that then goes away is lost, and its caller sees
//! [`EngineError::ResultLost`](crate::error::EngineError::ResultLost).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};

use super::header::Header;
use super::payload::Payload;
use super::types::{ActivityInfo, WorkflowInfo};
use crate::error::{EngineError, EngineResult, FailureInfo};

/// Outcome delivered back to whoever scheduled a task.
pub(crate) type TaskOutcome = Result<Payload, FailureInfo>;

pub(crate) struct WorkflowTask {
    pub info: WorkflowInfo,
    pub input: Payload,
    pub header: Header,
    pub reply: oneshot::Sender<TaskOutcome>,
}

pub(crate) struct ActivityTask {
    pub info: ActivityInfo,
    pub input: Payload,
    pub header: Header,
    pub reply: oneshot::Sender<TaskOutcome>,
}

pub(crate) enum Task {
    Workflow(WorkflowTask),
    Activity(ActivityTask),
}

#[derive(Clone)]
struct TaskQueue {
    tx: mpsc::UnboundedSender<Task>,
    rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<Task>>>,
}

impl TaskQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(AsyncMutex::new(rx)),
        }
    }
}

/// Engine that dispatches tasks to workers in the same process.
#[derive(Clone, Default)]
pub struct LocalEngine {
    queues: Arc<Mutex<HashMap<String, TaskQueue>>>,
}

impl LocalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, name: &str) -> TaskQueue {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues
            .entry(name.to_string())
            .or_insert_with(TaskQueue::new)
            .clone()
    }

    pub(crate) fn dispatch(&self, task_queue: &str, task: Task) -> EngineResult<()> {
        self.queue(task_queue)
            .tx
            .send(task)
            .map_err(|_| EngineError::QueueClosed(task_queue.to_string()))
    }

    pub(crate) fn poller(&self, task_queue: &str) -> TaskPoller {
        TaskPoller {
            rx: self.queue(task_queue).rx,
        }
    }
}

/// Receiving end of a task queue. Several pollers on the same queue take
/// turns.
pub(crate) struct TaskPoller {
    rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<Task>>>,
}

impl TaskPoller {
    /// Wait for the next task. Cancel safe.
    pub async fn next(&self) -> Option<Task> {
        self.rx.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn workflow_task(id: &str) -> (Task, oneshot::Receiver<TaskOutcome>) {
        let (reply, rx) = oneshot::channel();
        let task = Task::Workflow(WorkflowTask {
            info: WorkflowInfo {
                workflow_id: id.to_string(),
                run_id: Uuid::new_v4(),
                workflow_type: "Test".to_string(),
                task_queue: "q".to_string(),
                namespace: "default".to_string(),
                started_at: Utc::now(),
            },
            input: Payload::encode("x").unwrap(),
            header: Header::new(),
            reply,
        });
        (task, rx)
    }

    #[tokio::test]
    async fn test_queues_are_shared_between_clones() {
        let engine = LocalEngine::new();
        let poller = engine.clone().poller("q");

        let (task, _rx) = workflow_task("wf-1");
        engine.dispatch("q", task).unwrap();

        match poller.next().await {
            Some(Task::Workflow(task)) => assert_eq!(task.info.workflow_id, "wf-1"),
            _ => panic!("expected workflow task"),
        }
    }

    #[tokio::test]
    async fn test_queues_are_isolated_by_name() {
        let engine = LocalEngine::new();
        let (task, _rx) = workflow_task("wf-1");
        engine.dispatch("other", task).unwrap();

        let poller = engine.poller("q");
        let next = tokio::time::timeout(std::time::Duration::from_millis(20), poller.next()).await;
        assert!(next.is_err());
    }
}
