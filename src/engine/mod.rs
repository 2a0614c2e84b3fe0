//! The narrow seam between application code and the workflow engine.
//!
//! Workflows and activities are typed ([`Workflow`], [`Activity`]); the
//! [`Client`] starts workflows and the [`Worker`] runs them. Values cross the
//! engine as [`Payload`]s and every task carries a [`Header`] that
//! [`ContextPropagator`]s read and write.
//!
//! [`LocalEngine`] is the in-process binding: task queues are channels,
//! results come back on oneshots, and nothing is durable.

mod client;
mod context;
mod header;
mod local;
mod payload;
mod types;
mod worker;
mod workflow;

pub use client::{Client, ClientBuilder, WorkflowHandle};
pub use context::{ActivityContext, WorkflowContext};
pub use header::{ContextPropagator, Header, HeaderReader, HeaderWriter};
pub use local::LocalEngine;
pub use payload::{ENCODING_JSON, METADATA_ENCODING, Payload};
pub use types::{ActivityInfo, ActivityOptions, StartWorkflowOptions, WorkerOptions, WorkflowInfo};
pub use worker::{Worker, WorkerHandle};
pub use workflow::{Activity, Workflow};
