//! OpenTelemetry setup for the workflow client and worker.
//!
//! This module provides:
//! - Resource description and OTLP/gRPC exporter construction
//! - Tracer and meter providers, reachable through [`TelemetryContext`]
//! - W3C Trace Context propagation across the client/worker boundary
//! - Engine metrics recorded through the explicit meter
//! - Bootstrap and ordered, deadline-bounded shutdown
//!
//! # Usage
//!
//! ```ignore
//! let telemetry = TelemetryBuilder::from_env().build()?;
//! let client = Client::builder().telemetry(telemetry.context().clone()).build()?;
//! // ...
//! telemetry.shutdown(DEFAULT_SHUTDOWN_DEADLINE).await;
//! ```

mod bootstrap;
mod exporter;
mod metrics;
mod propagation;
mod provider;
mod resource;

/// Instrumentation scope used for the crate's tracers and meters.
pub const INSTRUMENTATION_SCOPE: &str = "otel-hello-workflow";

pub use bootstrap::{
    DEFAULT_SHUTDOWN_DEADLINE, Lifecycle, LifecycleState, ShutdownFailure, ShutdownReport,
    ShutdownSequence, ShutdownStep, Telemetry, TelemetryBuilder, TelemetryError,
};
pub use exporter::ExporterFactory;
pub use metrics::*;
pub use propagation::{TRACEPARENT_HEADER, TraceCarrier, TracingContextPropagator, has_trace_context};
pub use provider::{TelemetryContext, composite_propagator, meter_provider, tracer_provider};
pub use resource::{ResourceDescriptor, SERVICE_VERSION};
