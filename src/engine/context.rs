use chrono::Utc;
use opentelemetry::Context;
use opentelemetry::trace::{SpanContext, TraceContextExt};
use std::sync::Arc;
use tokio::sync::oneshot;

use super::header::{ContextPropagator, Header};
use super::local::{ActivityTask, LocalEngine, Task};
use super::payload::Payload;
use super::types::{ActivityInfo, ActivityOptions, WorkflowInfo};
use super::workflow::Activity;
use crate::error::{EngineError, TaskResult};

pub(crate) type Propagators = Arc<[Arc<dyn ContextPropagator>]>;

/// Context handed to workflow code.
///
/// Activities scheduled through it inherit the workflow's header, so context
/// injected by the client flows on to every activity the workflow runs.
pub struct WorkflowContext {
    info: WorkflowInfo,
    header: Header,
    activity_options: ActivityOptions,
    engine: LocalEngine,
    propagators: Propagators,
    activity_seq: u64,
}

impl WorkflowContext {
    pub(crate) fn new(
        info: WorkflowInfo,
        header: Header,
        engine: LocalEngine,
        propagators: Propagators,
    ) -> Self {
        Self {
            info,
            header,
            activity_options: ActivityOptions::default(),
            engine,
            propagators,
            activity_seq: 0,
        }
    }

    pub fn info(&self) -> &WorkflowInfo {
        &self.info
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn activity_options(&self) -> ActivityOptions {
        self.activity_options
    }

    /// Options applied to activities scheduled after this call.
    pub fn set_activity_options(&mut self, options: ActivityOptions) {
        self.activity_options = options;
    }

    /// Schedule an activity on this workflow's task queue and wait for its
    /// result.
    ///
    /// # Errors
    ///
    /// - [`EngineError::ActivityTimeout`] if the activity does not finish
    ///   within the start-to-close timeout
    /// - [`EngineError::ActivityFailed`] if the activity returned an error
    pub async fn execute_activity<A: Activity>(
        &mut self,
        input: &A::Input,
    ) -> TaskResult<A::Output> {
        self.activity_seq += 1;
        let timeout = self.activity_options.start_to_close_timeout;

        let mut header = self.header.clone();
        for propagator in self.propagators.iter() {
            propagator
                .inject_from_workflow(self, &mut header)
                .map_err(EngineError::Propagation)?;
        }

        let (reply, outcome) = oneshot::channel();
        let task = ActivityTask {
            info: ActivityInfo {
                activity_id: self.activity_seq.to_string(),
                activity_type: A::NAME.to_string(),
                workflow_id: self.info.workflow_id.clone(),
                workflow_run_id: self.info.run_id,
                task_queue: self.info.task_queue.clone(),
                attempt: 1,
                scheduled_at: Utc::now(),
            },
            input: Payload::encode(input)?,
            header,
            reply,
        };
        self.engine
            .dispatch(&self.info.task_queue, Task::Activity(task))?;

        let outcome = match tokio::time::timeout(timeout, outcome).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => return Err(EngineError::ResultLost(A::NAME.to_string()).into()),
            Err(_) => {
                return Err(EngineError::ActivityTimeout {
                    activity_type: A::NAME.to_string(),
                    timeout,
                }
                .into());
            }
        };

        match outcome {
            Ok(payload) => Ok(payload.decode()?),
            Err(failure) => Err(EngineError::ActivityFailed {
                activity_type: A::NAME.to_string(),
                failure,
            }
            .into()),
        }
    }
}

/// Context handed to activity code.
pub struct ActivityContext {
    info: ActivityInfo,
    otel: Context,
}

impl ActivityContext {
    pub(crate) fn new(info: ActivityInfo, otel: Context) -> Self {
        Self { info, otel }
    }

    pub fn info(&self) -> &ActivityInfo {
        &self.info
    }

    /// OpenTelemetry context of the activity's span.
    pub fn otel_context(&self) -> &Context {
        &self.otel
    }

    pub fn span_context(&self) -> SpanContext {
        self.otel.span().span_context().clone()
    }
}

