//! A Hello World workflow with OpenTelemetry tracing and metrics carried
//! across the client/worker boundary.
//!
//! - [`telemetry`]: bootstrap, context propagation, metrics and ordered shutdown
//! - [`engine`]: typed workflows and activities, client, worker, in-process engine
//! - [`greeting`]: the workflow and activity themselves
//! - [`app`]: command line modes

pub mod app;
pub mod config;
pub mod engine;
mod error;
pub mod greeting;
pub mod starter;
pub mod telemetry;

// Re-export public API
pub use engine::{
    Activity, ActivityContext, Client, StartWorkflowOptions, Worker, WorkerOptions, Workflow,
    WorkflowContext,
};
pub use error::{
    EngineError, EngineResult, FailureInfo, PayloadError, TaskError, TaskResult, serialize_error,
};
pub use telemetry::{Telemetry, TelemetryBuilder, TelemetryContext, TelemetryError};

// Re-export async_trait for convenience
pub use async_trait::async_trait;
