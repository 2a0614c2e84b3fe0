use opentelemetry::trace::{SpanBuilder, SpanKind, Status, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, broadcast, mpsc};

use super::client::Client;
use super::context::{ActivityContext, Propagators, WorkflowContext};
use super::local::{ActivityTask, LocalEngine, Task, WorkflowTask};
use super::types::WorkerOptions;
use super::workflow::{Activity, ActivityRegistry, Workflow, WorkflowRegistry};
use crate::error::{FailureInfo, serialize_error};
use crate::telemetry::{ACTIVITY_WORKER, INSTRUMENTATION_SCOPE, TelemetryContext, WORKFLOW_WORKER};

/// A worker that executes workflows and activities from one task queue.
///
/// Register every workflow and activity type before calling
/// [`start`](Self::start); the registries are frozen once the worker runs.
///
/// # Example
///
/// ```ignore
/// let mut worker = Worker::new(&client, "hello-world-task-queue", WorkerOptions::default());
/// worker
///     .register_workflow::<HelloWorldWorkflow>()
///     .register_activity::<HelloWorldActivity>();
/// let handle = worker.start();
///
/// tokio::signal::ctrl_c().await?;
///
/// // Graceful shutdown waits for in-flight tasks, up to the shutdown timeout
/// handle.shutdown().await;
/// ```
pub struct Worker {
    engine: LocalEngine,
    task_queue: String,
    options: WorkerOptions,
    identity: String,
    workflows: WorkflowRegistry,
    activities: ActivityRegistry,
    telemetry: TelemetryContext,
    propagators: Propagators,
}

/// Execution slots, one pool per task kind.
struct Slots {
    workflow: Arc<Semaphore>,
    activity: Arc<Semaphore>,
}

/// State shared by every task the worker runs.
struct WorkerShared {
    engine: LocalEngine,
    task_queue: String,
    workflows: WorkflowRegistry,
    activities: ActivityRegistry,
    telemetry: TelemetryContext,
    propagators: Propagators,
}

impl Worker {
    pub fn new(client: &Client, task_queue: impl Into<String>, options: WorkerOptions) -> Self {
        let identity = options.identity.clone().unwrap_or_else(|| {
            format!(
                "{}:{}",
                hostname::get()
                    .map(|h| h.to_string_lossy().to_string())
                    .unwrap_or_else(|_| "unknown".to_string()),
                std::process::id()
            )
        });

        Self {
            engine: client.engine().clone(),
            task_queue: task_queue.into(),
            options,
            identity,
            workflows: WorkflowRegistry::new(),
            activities: ActivityRegistry::new(),
            telemetry: client.telemetry().clone(),
            propagators: client.propagators(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn register_workflow<W: Workflow>(&mut self) -> &mut Self {
        self.workflows
            .insert(W::NAME.to_string(), Arc::new(PhantomData::<W>));
        self
    }

    pub fn register_activity<A: Activity>(&mut self) -> &mut Self {
        self.activities
            .insert(A::NAME.to_string(), Arc::new(PhantomData::<A>));
        self
    }

    /// Start polling in the background.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, _) = broadcast::channel(1);
        let shutdown_rx = shutdown_tx.subscribe();

        tracing::info!(
            task_queue = %self.task_queue,
            identity = %self.identity,
            workflows = self.workflows.len(),
            activities = self.activities.len(),
            "Worker started"
        );

        let shared = Arc::new(WorkerShared {
            engine: self.engine,
            task_queue: self.task_queue,
            workflows: self.workflows,
            activities: self.activities,
            telemetry: self.telemetry,
            propagators: self.propagators,
        });
        let handle = tokio::spawn(Self::run_loop(shared, self.options.clone(), shutdown_rx));

        WorkerHandle {
            shutdown_tx,
            handle,
            shutdown_timeout: self.options.shutdown_timeout,
            identity: self.identity,
        }
    }

    async fn run_loop(
        shared: Arc<WorkerShared>,
        options: WorkerOptions,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        // Separate pools so waiting workflows never starve their activities
        let slots = Slots {
            workflow: Arc::new(Semaphore::new(options.max_concurrent_workflow_tasks)),
            activity: Arc::new(Semaphore::new(options.max_concurrent_activity_tasks)),
        };

        // Every running task holds a clone of done_tx; the channel closes once all are gone
        let (done_tx, mut done_rx) = mpsc::channel::<()>(1);

        let metrics = shared.telemetry.metrics();
        metrics.set_task_slots_available(
            &shared.task_queue,
            WORKFLOW_WORKER,
            slots.workflow.available_permits(),
        );
        metrics.set_task_slots_available(
            &shared.task_queue,
            ACTIVITY_WORKER,
            slots.activity.available_permits(),
        );

        let poller = shared.engine.poller(&shared.task_queue);
        let mut queue_open = true;

        loop {
            tokio::select! {
                // Shutdown signal received
                _ = shutdown_rx.recv() => break,

                task = poller.next() => {
                    let Some(task) = task else {
                        tracing::warn!("Task queue {} closed", shared.task_queue);
                        queue_open = false;
                        break;
                    };
                    Self::spawn_task(&shared, &slots, task, done_tx.clone());
                }
            }
        }

        tracing::info!("Worker shutting down, waiting for in-flight tasks...");

        // In-flight workflows may still schedule activities. Keep serving those
        // until the last running task is done; new workflows are held back and
        // returned to the queue afterwards.
        let weak_done = done_tx.downgrade();
        drop(done_tx);
        let mut deferred = Vec::new();

        while queue_open {
            tokio::select! {
                biased;

                _ = done_rx.recv() => break,

                task = poller.next() => match task {
                    Some(Task::Activity(task)) => match weak_done.upgrade() {
                        Some(done) => Self::spawn_task(&shared, &slots, Task::Activity(task), done),
                        None => deferred.push(Task::Activity(task)),
                    },
                    Some(task) => deferred.push(task),
                    None => queue_open = false,
                },
            }
        }
        while done_rx.recv().await.is_some() {}

        for task in deferred {
            if let Err(e) = shared.engine.dispatch(&shared.task_queue, task) {
                tracing::error!("Failed to requeue task during shutdown: {}", e);
            }
        }
        tracing::info!("Worker shutdown complete");
    }

    fn spawn_task(shared: &Arc<WorkerShared>, slots: &Slots, task: Task, done_tx: mpsc::Sender<()>) {
        let (slots, worker_type) = match &task {
            Task::Workflow(_) => (slots.workflow.clone(), WORKFLOW_WORKER),
            Task::Activity(_) => (slots.activity.clone(), ACTIVITY_WORKER),
        };
        let shared = shared.clone();

        tokio::spawn(async move {
            // Semaphore is never closed, so this cannot fail
            let Ok(permit) = slots.clone().acquire_owned().await else {
                return;
            };
            let metrics = shared.telemetry.metrics();
            metrics.set_task_slots_available(&shared.task_queue, worker_type, slots.available_permits());

            match task {
                Task::Workflow(task) => Self::execute_workflow(&shared, task).await,
                Task::Activity(task) => Self::execute_activity(&shared, task).await,
            }

            drop(permit);
            metrics.set_task_slots_available(&shared.task_queue, worker_type, slots.available_permits());
            drop(done_tx);
        });
    }

    async fn execute_workflow(shared: &WorkerShared, task: WorkflowTask) {
        let WorkflowTask {
            info,
            input,
            header,
            reply,
        } = task;
        let task_label = format!("{} ({})", info.workflow_type, info.workflow_id);

        let Some(handler) = shared.workflows.get(&info.workflow_type).cloned() else {
            tracing::error!("Unknown workflow: {}", info.workflow_type);
            let _ = reply.send(Err(FailureInfo::new(
                "WorkflowNotRegistered",
                format!(
                    "workflow type `{}` is not registered on task queue `{}`",
                    info.workflow_type, info.task_queue
                ),
            )));
            return;
        };

        let mut ctx = WorkflowContext::new(
            info,
            header.clone(),
            shared.engine.clone(),
            shared.propagators.clone(),
        );
        for propagator in shared.propagators.iter() {
            if let Err(e) = propagator.extract_to_workflow(&mut ctx, &header) {
                tracing::error!("Workflow {} rejected its header: {}", task_label, e);
                let _ = reply.send(Err(FailureInfo::new("PayloadError", e.to_string())));
                return;
            }
        }

        let outcome = match handler.execute(input, ctx).await {
            Ok(output) => {
                tracing::debug!("Workflow {} completed", task_label);
                Ok(output)
            }
            Err(e) => {
                tracing::error!("Workflow {} failed: {}", task_label, e);
                Err(serialize_error(&e))
            }
        };

        if reply.send(outcome).is_err() {
            tracing::debug!("Caller of workflow {} is gone", task_label);
        }
    }

    async fn execute_activity(shared: &WorkerShared, task: ActivityTask) {
        let ActivityTask {
            info,
            input,
            header,
            reply,
        } = task;
        let task_label = format!("{} ({})", info.activity_type, info.workflow_id);

        let Some(handler) = shared.activities.get(&info.activity_type).cloned() else {
            tracing::error!("Unknown activity: {}", info.activity_type);
            let _ = reply.send(Err(FailureInfo::new(
                "ActivityNotRegistered",
                format!(
                    "activity type `{}` is not registered on task queue `{}`",
                    info.activity_type, info.task_queue
                ),
            )));
            return;
        };

        let mut parent = Context::new();
        for propagator in shared.propagators.iter() {
            match propagator.extract(&parent, &header) {
                Ok(cx) => parent = cx,
                Err(e) => {
                    tracing::error!("Activity {} has a malformed header: {}", task_label, e);
                    let _ = reply.send(Err(FailureInfo::new("PayloadError", e.to_string())));
                    return;
                }
            }
        }

        let tracer = shared.telemetry.tracer(INSTRUMENTATION_SCOPE);
        let span = SpanBuilder::from_name(format!("RunActivity:{}", info.activity_type))
            .with_kind(SpanKind::Server)
            .with_attributes([
                KeyValue::new("activity.type", info.activity_type.clone()),
                KeyValue::new("activity.id", info.activity_id.clone()),
                KeyValue::new("workflow.id", info.workflow_id.clone()),
                KeyValue::new("workflow.task_queue", info.task_queue.clone()),
            ])
            .start_with_context(&tracer, &parent);
        let cx = parent.with_span(span);

        let task_queue = info.task_queue.clone();
        let activity_type = info.activity_type.clone();
        let started = Instant::now();
        let result = handler
            .execute(input, ActivityContext::new(info, cx.clone()))
            .await;
        let elapsed = started.elapsed();

        let span = cx.span();
        let outcome = match result {
            Ok(output) => {
                shared.telemetry.metrics().record_activity_duration(
                    &task_queue,
                    &activity_type,
                    "completed",
                    elapsed.as_secs_f64(),
                );
                Ok(output)
            }
            Err(e) => {
                tracing::error!("Activity {} failed: {}", task_label, e);
                span.set_status(Status::error(e.to_string()));
                shared.telemetry.metrics().record_activity_duration(
                    &task_queue,
                    &activity_type,
                    "failed",
                    elapsed.as_secs_f64(),
                );
                Err(serialize_error(&e))
            }
        };
        span.end();

        if reply.send(outcome).is_err() {
            tracing::warn!("Activity {} finished after its workflow stopped waiting", task_label);
        }
    }
}

/// Handle on a running worker.
pub struct WorkerHandle {
    shutdown_tx: broadcast::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
    shutdown_timeout: Duration,
    identity: String,
}

impl WorkerHandle {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Gracefully shut down the worker.
    ///
    /// Signals the worker to stop accepting new workflows and waits for
    /// in-flight tasks, up to the configured shutdown timeout. Activities
    /// scheduled by in-flight workflows are still served meanwhile. Returns
    /// `false` if the timeout expired first; the remaining tasks are left
    /// running detached.
    pub async fn shutdown(self) -> bool {
        let _ = self.shutdown_tx.send(());
        match tokio::time::timeout(self.shutdown_timeout, self.handle).await {
            Ok(_) => true,
            Err(_) => {
                tracing::warn!(
                    "Worker {} did not drain within {:?}",
                    self.identity,
                    self.shutdown_timeout
                );
                false
            }
        }
    }
}
