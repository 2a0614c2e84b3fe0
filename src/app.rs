//! Command line entry point: worker mode or start-and-wait mode.

use clap::{Parser, Subcommand};
use opentelemetry::trace::{Span as _, SpanBuilder, SpanKind};
use opentelemetry::{Context, KeyValue};
use std::process::ExitCode;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{EngineConfig, OtlpConfig};
use crate::engine::{Client, Worker, WorkerHandle, WorkerOptions};
use crate::error::EngineError;
use crate::greeting::{HelloWorldActivity, HelloWorldWorkflow, resolve_workflow_name};
use crate::starter::{self, WorkflowRun};
use crate::telemetry::{
    DEFAULT_SHUTDOWN_DEADLINE, TelemetryBuilder, TelemetryContext, TelemetryError,
    TracingContextPropagator,
};

/// How long the starter waits for the workflow result.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(
    name = "otel-hello-workflow",
    version,
    about = "Hello World workflow with OpenTelemetry tracing and metrics",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Run in worker mode (same as the `worker` subcommand)
    #[arg(long)]
    pub worker: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll the task queue until interrupted.
    ///
    /// The local engine lives inside this process, so a standalone worker
    /// only serves clients created in the same process.
    Worker,
    /// Start the workflow and wait for its result
    Start {
        /// Name to greet. Overrides WORKFLOW_NAME.
        name: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    RunWorker,
    StartWorkflow { name: String },
}

impl Cli {
    pub fn mode<F>(&self, lookup: F) -> Mode
    where
        F: Fn(&str) -> Option<String>,
    {
        match &self.command {
            Some(Command::Worker) => Mode::RunWorker,
            _ if self.worker => Mode::RunWorker,
            Some(Command::Start { name }) => Mode::StartWorkflow {
                name: resolve_workflow_name(name.clone(), lookup),
            },
            None => Mode::StartWorkflow {
                name: resolve_workflow_name(None, lookup),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to initialize OpenTelemetry: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("unable to create client: {0}")]
    Client(#[source] EngineError),

    #[error("workflow execution timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("workflow failed: {0}")]
    Workflow(#[source] EngineError),

    #[error("interrupted before the workflow completed")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    WorkerStopped,
    WorkflowCompleted(WorkflowRun),
}

/// A configured client plus what each mode needs to run.
pub struct App {
    client: Client,
    service_name: String,
    task_queue: String,
    worker_options: WorkerOptions,
    execution_timeout: Duration,
}

impl App {
    pub fn new(client: Client, service_name: impl Into<String>) -> Self {
        let task_queue = client.task_queue().to_string();
        Self {
            client,
            service_name: service_name.into(),
            task_queue,
            worker_options: WorkerOptions::default(),
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }

    pub fn worker_options(mut self, options: WorkerOptions) -> Self {
        self.worker_options = options;
        self
    }

    pub fn execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    fn start_worker(&self) -> WorkerHandle {
        let mut worker = Worker::new(&self.client, &self.task_queue, self.worker_options.clone());
        worker
            .register_workflow::<HelloWorldWorkflow>()
            .register_activity::<HelloWorldActivity>();
        worker.start()
    }

    /// Run one mode to completion.
    ///
    /// Worker mode returns once `cancel` fires. Start mode hosts a worker for
    /// the duration of the run, since the local engine lives in this process.
    pub async fn execute(&self, mode: Mode, cancel: CancellationToken) -> Result<Outcome, AppError> {
        match mode {
            Mode::RunWorker => {
                tracing::info!("Starting worker process...");
                tracing::info!(
                    task_queue = %self.task_queue,
                    "Worker serves the in-process engine only; start workflows from this process"
                );
                let worker = self.start_worker();
                cancel.cancelled().await;
                worker.shutdown().await;
                Ok(Outcome::WorkerStopped)
            }
            Mode::StartWorkflow { name } => {
                if cancel.is_cancelled() {
                    return Err(AppError::Cancelled);
                }

                let worker = self.start_worker();
                let run = starter::run_hello_workflow(
                    &self.client,
                    &self.service_name,
                    &self.task_queue,
                    &name,
                );

                let outcome = tokio::select! {
                    biased;

                    _ = cancel.cancelled() => Err(AppError::Cancelled),
                    result = tokio::time::timeout(self.execution_timeout, run) => match result {
                        Ok(Ok(run)) => Ok(Outcome::WorkflowCompleted(run)),
                        Ok(Err(e)) => Err(AppError::Workflow(e)),
                        Err(_) => Err(AppError::Timeout(self.execution_timeout)),
                    },
                };

                worker.shutdown().await;
                outcome
            }
        }
    }
}

/// Emit a single span with an event so a fresh collector shows something
/// before the first workflow runs.
pub fn emit_connection_test_span(telemetry: &TelemetryContext, service_name: &str) {
    let tracer = telemetry.tracer("test-tracer");
    let mut span = SpanBuilder::from_name("TestConnection")
        .with_kind(SpanKind::Internal)
        .with_attributes([
            KeyValue::new("test.attribute", "test-value"),
            KeyValue::new("service.name", service_name.to_string()),
        ])
        .start_with_context(&tracer, &Context::current());

    let span_context = span.span_context().clone();
    tracing::debug!(
        trace_id = %span_context.trace_id(),
        span_id = %span_context.span_id(),
        "Created test span"
    );

    span.add_event(
        "test.event",
        vec![
            KeyValue::new("event.type", "test"),
            KeyValue::new("event.message", "Testing OpenTelemetry connection"),
        ],
    );
    span.end();
}

/// Cancel `cancel` on the first SIGINT or SIGTERM.
pub fn spawn_signal_watcher(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let signal = shutdown_signal().await;
        tracing::info!("Received {}, initiating shutdown...", signal);
        cancel.cancel();
    })
}

async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        if let Ok(mut terminate) = signal(SignalKind::terminate()) {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if result.is_ok() {
                        return "SIGINT";
                    }
                }
                _ = terminate.recv() => return "SIGTERM",
            }
            terminate.recv().await;
            return "SIGTERM";
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => "SIGINT",
        Err(e) => {
            tracing::warn!("Cannot listen for interrupts: {}", e);
            std::future::pending().await
        }
    }
}

/// Bootstrap telemetry from the environment, run the selected mode, then
/// shut telemetry down.
///
/// Failures after bootstrap are logged here before being returned; a
/// bootstrap failure is returned unlogged since no subscriber exists yet.
pub async fn run(cli: Cli) -> Result<Outcome, AppError> {
    let otlp = OtlpConfig::from_env();
    let service_name = otlp.service_name.clone();

    let telemetry = TelemetryBuilder::new().config(otlp).build()?;
    tracing::info!("OpenTelemetry initialized successfully");
    emit_connection_test_span(telemetry.context(), &service_name);

    let cancel = CancellationToken::new();
    let watcher = spawn_signal_watcher(cancel.clone());

    let result = async {
        let context = telemetry.context().clone();
        let client = Client::builder()
            .config(EngineConfig::from_env())
            .propagator(TracingContextPropagator::new(context.propagator()))
            .telemetry(context)
            .build()
            .map_err(AppError::Client)?;

        let mode = cli.mode(|key| std::env::var(key).ok());
        App::new(client, service_name).execute(mode, cancel).await
    }
    .await;

    match &result {
        Ok(Outcome::WorkflowCompleted(run)) => {
            tracing::info!(workflow_id = %run.workflow_id, "Workflow completed successfully: {}", run.result)
        }
        Ok(Outcome::WorkerStopped) => tracing::info!("Worker stopped"),
        Err(e) => tracing::error!("{}", e),
    }
    watcher.abort();

    tracing::info!("Cleaning up OpenTelemetry resources...");
    let report = telemetry.shutdown(DEFAULT_SHUTDOWN_DEADLINE).await;
    if !report.is_clean() {
        tracing::warn!("Telemetry shutdown incomplete: {:?}", report.failures);
    }

    result
}

/// Map the result of [`run`] to the process exit status.
///
/// Only a bootstrap failure is returned as an error; every other failure
/// was already logged by `run` and becomes a plain failure exit code.
pub fn exit_status(result: Result<Outcome, AppError>) -> anyhow::Result<ExitCode> {
    match result {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(AppError::Telemetry(e)) => Err(e.into()),
        Err(_) => Ok(ExitCode::FAILURE),
    }
}
