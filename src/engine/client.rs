use opentelemetry::Context;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::context::Propagators;
use super::header::{ContextPropagator, Header};
use super::local::{LocalEngine, Task, TaskOutcome, WorkflowTask};
use super::payload::Payload;
use super::types::{StartWorkflowOptions, WorkflowInfo};
use super::workflow::Workflow;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::telemetry::{EngineMetrics, TelemetryContext};

/// Client for starting workflows.
///
/// Cheap to clone. Workers are created from a client and share its engine
/// connection, telemetry and propagators.
///
/// # Example
///
/// ```ignore
/// let client = Client::builder()
///     .config(EngineConfig::from_env())
///     .telemetry(telemetry.context().clone())
///     .propagator(TracingContextPropagator::w3c())
///     .build()?;
///
/// let handle = client
///     .start_workflow::<HelloWorldWorkflow>(&cx, StartWorkflowOptions::default(), &"Ada".to_string())
///     .await?;
/// let greeting = handle.result().await?;
/// ```
#[derive(Clone)]
pub struct Client {
    engine: LocalEngine,
    config: EngineConfig,
    secure: bool,
    telemetry: TelemetryContext,
    propagators: Propagators,
}

/// Builder for configuring a [`Client`].
pub struct ClientBuilder {
    engine: Option<LocalEngine>,
    config: EngineConfig,
    telemetry: Option<TelemetryContext>,
    propagators: Vec<Arc<dyn ContextPropagator>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            engine: None,
            config: EngineConfig::default(),
            telemetry: None,
            propagators: Vec::new(),
        }
    }

    /// Engine to connect to. A fresh [`LocalEngine`] is used when unset.
    pub fn engine(mut self, engine: LocalEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Telemetry used for metrics and worker spans. No-op when unset.
    pub fn telemetry(mut self, telemetry: TelemetryContext) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Add a context propagator. Propagators run in registration order.
    pub fn propagator(mut self, propagator: impl ContextPropagator + 'static) -> Self {
        self.propagators.push(Arc::new(propagator));
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the configured mTLS files cannot be
    /// loaded.
    pub fn build(self) -> EngineResult<Client> {
        let tls = self.config.load_tls()?;
        let secure = tls.is_some();

        tracing::info!(
            address = %self.config.address,
            namespace = %self.config.namespace,
            mtls = secure,
            "Connected to workflow engine"
        );

        Ok(Client {
            engine: self.engine.unwrap_or_default(),
            config: self.config,
            secure,
            telemetry: self.telemetry.unwrap_or_else(TelemetryContext::noop),
            propagators: Arc::from(self.propagators),
        })
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Default task queue for workflows started without an explicit queue.
    pub fn task_queue(&self) -> &str {
        &self.config.task_queue
    }

    /// Whether the connection uses mutual TLS.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn telemetry(&self) -> &TelemetryContext {
        &self.telemetry
    }

    pub(crate) fn engine(&self) -> &LocalEngine {
        &self.engine
    }

    pub(crate) fn propagators(&self) -> Propagators {
        self.propagators.clone()
    }

    /// Start a workflow. `cx` is injected into the workflow header by every
    /// registered propagator.
    pub async fn start_workflow<W: Workflow>(
        &self,
        cx: &Context,
        options: StartWorkflowOptions,
        input: &W::Input,
    ) -> EngineResult<WorkflowHandle<W::Output>> {
        self.start_workflow_by_name(cx, W::NAME, options, Payload::encode(input)?)
            .await
    }

    /// Start a workflow by type name with an already encoded input.
    #[tracing::instrument(
        name = "engine.client.start_workflow",
        skip(self, cx, options, input),
        fields(task_queue, workflow_id, workflow_type = %workflow_type)
    )]
    pub async fn start_workflow_by_name<O: DeserializeOwned>(
        &self,
        cx: &Context,
        workflow_type: &str,
        options: StartWorkflowOptions,
        input: Payload,
    ) -> EngineResult<WorkflowHandle<O>> {
        let mut header = Header::new();
        for propagator in self.propagators.iter() {
            propagator
                .inject(cx, &mut header)
                .map_err(EngineError::Propagation)?;
        }

        let task_queue = options
            .task_queue
            .unwrap_or_else(|| self.config.task_queue.clone());
        let workflow_id = options
            .id
            .unwrap_or_else(|| format!("{}-{}", workflow_type, Uuid::new_v4()));
        let span = tracing::Span::current();
        span.record("task_queue", task_queue.as_str());
        span.record("workflow_id", workflow_id.as_str());

        let info = WorkflowInfo {
            workflow_id: workflow_id.clone(),
            run_id: Uuid::new_v4(),
            workflow_type: workflow_type.to_string(),
            task_queue: task_queue.clone(),
            namespace: self.config.namespace.clone(),
            started_at: chrono::Utc::now(),
        };
        let run_id = info.run_id;

        let (reply, outcome) = oneshot::channel();
        self.engine.dispatch(
            &task_queue,
            Task::Workflow(WorkflowTask {
                info,
                input,
                header,
                reply,
            }),
        )?;

        self.telemetry
            .metrics()
            .record_workflow_started(&task_queue, workflow_type);
        tracing::info!(%run_id, "Started workflow");

        Ok(WorkflowHandle {
            workflow_id,
            run_id,
            workflow_type: workflow_type.to_string(),
            task_queue,
            outcome,
            metrics: self.telemetry.metrics().clone(),
            _output: PhantomData,
        })
    }
}

/// Handle on a started workflow.
pub struct WorkflowHandle<O> {
    workflow_id: String,
    run_id: Uuid,
    workflow_type: String,
    task_queue: String,
    outcome: oneshot::Receiver<TaskOutcome>,
    metrics: EngineMetrics,
    _output: PhantomData<fn() -> O>,
}

impl<O: DeserializeOwned> WorkflowHandle<O> {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Wait for the workflow to finish.
    ///
    /// Not bounded: wrap in a timeout to limit how long the caller waits.
    pub async fn result(self) -> EngineResult<O> {
        let outcome = self
            .outcome
            .await
            .map_err(|_| EngineError::ResultLost(self.workflow_id.clone()))?;

        match outcome {
            Ok(payload) => {
                self.metrics
                    .record_workflow_completed(&self.task_queue, &self.workflow_type);
                Ok(payload.decode()?)
            }
            Err(failure) => {
                self.metrics
                    .record_workflow_failed(&self.task_queue, &self.workflow_type, &failure.name);
                Err(EngineError::WorkflowFailed {
                    workflow_id: self.workflow_id,
                    failure,
                })
            }
        }
    }
}
