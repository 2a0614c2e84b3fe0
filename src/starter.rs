//! Starts the Hello World workflow under a small span tree and waits for the
//! greeting.

use chrono::{DateTime, Utc};
use opentelemetry::trace::{SpanBuilder, SpanKind, Status, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::Tracer;
use std::borrow::Cow;
use uuid::Uuid;

use crate::engine::{Client, StartWorkflowOptions, Workflow};
use crate::error::EngineResult;
use crate::greeting::HelloWorldWorkflow;
use crate::telemetry::INSTRUMENTATION_SCOPE;

/// Outcome of one workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowRun {
    pub workflow_id: String,
    pub run_id: Uuid,
    pub result: String,
}

pub fn workflow_id(now: DateTime<Utc>) -> String {
    format!("hello-world-{}", now.timestamp())
}

/// Attributes set on every starter span.
pub fn span_attributes(
    service_name: &str,
    workflow_type: &str,
    workflow_id: &str,
    task_queue: &str,
) -> Vec<KeyValue> {
    vec![
        KeyValue::new("workflow.type", workflow_type.to_string()),
        KeyValue::new("workflow.id", workflow_id.to_string()),
        KeyValue::new("workflow.task_queue", task_queue.to_string()),
        KeyValue::new("service.name", service_name.to_string()),
    ]
}

fn start_span(
    tracer: &Tracer,
    name: impl Into<Cow<'static, str>>,
    attributes: Vec<KeyValue>,
    parent: &Context,
) -> Context {
    let span = SpanBuilder::from_name(name)
        .with_kind(SpanKind::Client)
        .with_attributes(attributes)
        .start_with_context(tracer, parent);
    parent.with_span(span)
}

/// Start `HelloWorldWorkflow` with `name` and wait for its result.
///
/// Spans: `StartWorkflow` > `ExecuteWorkflow` >
/// `StartWorkflow:HelloWorldWorkflow`. The innermost one is injected into the
/// workflow header, so the worker's activity span joins the same trace.
pub async fn run_hello_workflow(
    client: &Client,
    service_name: &str,
    task_queue: &str,
    name: &str,
) -> EngineResult<WorkflowRun> {
    let workflow_id = workflow_id(Utc::now());
    let tracer = client.telemetry().tracer(INSTRUMENTATION_SCOPE);

    let attributes = span_attributes(service_name, "temporal", &workflow_id, task_queue);
    let start_cx = start_span(&tracer, "StartWorkflow", attributes.clone(), &Context::current());
    let execute_cx = start_span(&tracer, "ExecuteWorkflow", attributes, &start_cx);

    let mut workflow_attributes =
        span_attributes(service_name, HelloWorldWorkflow::NAME, &workflow_id, task_queue);
    workflow_attributes.push(KeyValue::new("workflow.input", name.to_string()));
    let workflow_cx = start_span(
        &tracer,
        format!("StartWorkflow:{}", HelloWorldWorkflow::NAME),
        workflow_attributes,
        &execute_cx,
    );

    tracing::info!("Starting workflow with input: {}", name);

    let run: EngineResult<WorkflowRun> = async {
        let handle = client
            .start_workflow::<HelloWorldWorkflow>(
                &workflow_cx,
                StartWorkflowOptions::new(workflow_id.clone(), task_queue),
                &name.to_string(),
            )
            .await?;
        tracing::info!("Started workflow with ID: {}", workflow_id);

        let run_id = handle.run_id();
        let result = handle.result().await?;
        tracing::info!("Workflow result: {}", result);

        Ok(WorkflowRun {
            workflow_id: workflow_id.clone(),
            run_id,
            result,
        })
    }
    .await;

    if let Err(e) = &run {
        workflow_cx.span().set_status(Status::error(e.to_string()));
    }
    for cx in [&workflow_cx, &execute_cx, &start_cx] {
        cx.span().end();
    }
    run
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_workflow_id_uses_unix_seconds() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default();
        assert_eq!(workflow_id(now), "hello-world-1704067200");
    }

    #[test]
    fn test_span_attributes() {
        let attributes = span_attributes("svc", "HelloWorldWorkflow", "wf-1", "q");
        let get = |key: &str| {
            attributes
                .iter()
                .find(|kv| kv.key.as_str() == key)
                .map(|kv| kv.value.as_str().to_string())
        };
        assert_eq!(get("workflow.type").as_deref(), Some("HelloWorldWorkflow"));
        assert_eq!(get("workflow.id").as_deref(), Some("wf-1"));
        assert_eq!(get("workflow.task_queue").as_deref(), Some("q"));
        assert_eq!(get("service.name").as_deref(), Some("svc"));
    }
}
