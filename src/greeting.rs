//! The Hello World workflow and its single activity.

use async_trait::async_trait;
use std::time::Duration;

use crate::engine::{Activity, ActivityContext, ActivityOptions, Workflow, WorkflowContext};
use crate::error::TaskResult;

pub const WORKFLOW_NAME_ENV: &str = "WORKFLOW_NAME";
pub const DEFAULT_WORKFLOW_NAME: &str = "Temporal";

/// Start-to-close timeout for the greeting activity.
pub const ACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);

pub fn greeting(name: &str) -> String {
    format!("Hello {name}!")
}

/// Name to greet: the command line wins, then `WORKFLOW_NAME`, then the
/// default. Empty values count as unset.
pub fn resolve_workflow_name<F>(cli: Option<String>, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    cli.filter(|name| !name.is_empty())
        .or_else(|| lookup(WORKFLOW_NAME_ENV).filter(|name| !name.is_empty()))
        .unwrap_or_else(|| DEFAULT_WORKFLOW_NAME.to_string())
}

pub struct HelloWorldActivity;

#[async_trait]
impl Activity for HelloWorldActivity {
    const NAME: &'static str = "HelloWorldActivity";
    type Input = String;
    type Output = String;

    async fn run(name: Self::Input, ctx: ActivityContext) -> TaskResult<Self::Output> {
        let span_context = ctx.span_context();
        tracing::info!(
            trace_id = %span_context.trace_id(),
            span_id = %span_context.span_id(),
            workflow_id = %ctx.info().workflow_id,
            "Activity: greeting {}",
            name
        );
        Ok(greeting(&name))
    }
}

pub struct HelloWorldWorkflow;

#[async_trait]
impl Workflow for HelloWorldWorkflow {
    const NAME: &'static str = "HelloWorldWorkflow";
    type Input = String;
    type Output = String;

    async fn run(name: Self::Input, mut ctx: WorkflowContext) -> TaskResult<Self::Output> {
        ctx.set_activity_options(ActivityOptions {
            start_to_close_timeout: ACTIVITY_TIMEOUT,
        });
        ctx.execute_activity::<HelloWorldActivity>(&name).await
    }
}
