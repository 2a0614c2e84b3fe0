//! Engine metrics recorded through an explicit OpenTelemetry meter.
//!
//! Names follow the engine's Prometheus-style conventions and are prefixed
//! with `temporal_`.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};

// Metric name constants
pub const WORKFLOW_STARTED: &str = "temporal_workflow_started";
pub const WORKFLOW_COMPLETED: &str = "temporal_workflow_completed";
pub const WORKFLOW_FAILED: &str = "temporal_workflow_failed";

pub const WORKER_TASK_SLOTS_AVAILABLE: &str = "temporal_worker_task_slots_available";

pub const ACTIVITY_EXECUTION_DURATION: &str = "temporal_activity_execution_duration_seconds";

/// Worker pool label values for [`EngineMetrics::set_task_slots_available`].
pub const WORKFLOW_WORKER: &str = "WorkflowWorker";
pub const ACTIVITY_WORKER: &str = "ActivityWorker";

/// Instruments shared by the engine client and worker.
#[derive(Clone)]
pub struct EngineMetrics {
    workflow_started: Counter<u64>,
    workflow_completed: Counter<u64>,
    workflow_failed: Counter<u64>,
    task_slots_available: Gauge<u64>,
    activity_execution_duration: Histogram<f64>,
}

impl EngineMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            workflow_started: meter
                .u64_counter(WORKFLOW_STARTED)
                .with_description("Total number of workflows started")
                .build(),
            workflow_completed: meter
                .u64_counter(WORKFLOW_COMPLETED)
                .with_description("Total number of workflows that completed successfully")
                .build(),
            workflow_failed: meter
                .u64_counter(WORKFLOW_FAILED)
                .with_description("Total number of workflows that failed")
                .build(),
            task_slots_available: meter
                .u64_gauge(WORKER_TASK_SLOTS_AVAILABLE)
                .with_description("Number of free execution slots per worker pool")
                .build(),
            activity_execution_duration: meter
                .f64_histogram(ACTIVITY_EXECUTION_DURATION)
                .with_description("Duration of activity execution in seconds")
                .with_unit("s")
                .build(),
        }
    }

    /// Record a workflow start
    pub fn record_workflow_started(&self, task_queue: &str, workflow_type: &str) {
        self.workflow_started.add(
            1,
            &[
                KeyValue::new("task_queue", task_queue.to_string()),
                KeyValue::new("workflow_type", workflow_type.to_string()),
            ],
        );
    }

    /// Record a successful workflow completion
    pub fn record_workflow_completed(&self, task_queue: &str, workflow_type: &str) {
        self.workflow_completed.add(
            1,
            &[
                KeyValue::new("task_queue", task_queue.to_string()),
                KeyValue::new("workflow_type", workflow_type.to_string()),
            ],
        );
    }

    /// Record a workflow failure
    pub fn record_workflow_failed(&self, task_queue: &str, workflow_type: &str, error_type: &str) {
        self.workflow_failed.add(
            1,
            &[
                KeyValue::new("task_queue", task_queue.to_string()),
                KeyValue::new("workflow_type", workflow_type.to_string()),
                KeyValue::new("error_type", error_type.to_string()),
            ],
        );
    }

    /// Set the free slot count of one worker pool
    pub fn set_task_slots_available(&self, task_queue: &str, worker_type: &str, available: usize) {
        self.task_slots_available.record(
            available as u64,
            &[
                KeyValue::new("task_queue", task_queue.to_string()),
                KeyValue::new("worker_type", worker_type.to_string()),
            ],
        );
    }

    /// Record activity execution duration
    pub fn record_activity_duration(
        &self,
        task_queue: &str,
        activity_type: &str,
        outcome: &str,
        duration_secs: f64,
    ) {
        self.activity_execution_duration.record(
            duration_secs,
            &[
                KeyValue::new("task_queue", task_queue.to_string()),
                KeyValue::new("activity_type", activity_type.to_string()),
                KeyValue::new("outcome", outcome.to_string()),
            ],
        );
    }
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineMetrics").finish_non_exhaustive()
    }
}
