use otel_hello_workflow::engine::{
    Activity, ActivityContext, ActivityOptions, Workflow, WorkflowContext,
};
use otel_hello_workflow::greeting::HelloWorldActivity;
use otel_hello_workflow::{TaskResult, async_trait};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

// ============================================================================
// FailingActivity - Always fails with the given message
// ============================================================================

pub struct FailingActivity;

#[async_trait]
impl Activity for FailingActivity {
    const NAME: &'static str = "FailingActivity";
    type Input = String;
    type Output = String;

    async fn run(message: Self::Input, _ctx: ActivityContext) -> TaskResult<Self::Output> {
        Err(anyhow::anyhow!("{}", message).into())
    }
}

pub struct FailingWorkflow;

#[async_trait]
impl Workflow for FailingWorkflow {
    const NAME: &'static str = "FailingWorkflow";
    type Input = String;
    type Output = String;

    async fn run(message: Self::Input, mut ctx: WorkflowContext) -> TaskResult<Self::Output> {
        ctx.execute_activity::<FailingActivity>(&message).await
    }
}

// ============================================================================
// SlowWorkflow - Runs an activity that outlives its start-to-close timeout
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowParams {
    pub sleep_ms: u64,
    pub timeout_ms: u64,
}

pub struct SleepActivity;

#[async_trait]
impl Activity for SleepActivity {
    const NAME: &'static str = "SleepActivity";
    type Input = u64;
    type Output = ();

    async fn run(sleep_ms: Self::Input, _ctx: ActivityContext) -> TaskResult<Self::Output> {
        tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
        Ok(())
    }
}

pub struct SlowWorkflow;

#[async_trait]
impl Workflow for SlowWorkflow {
    const NAME: &'static str = "SlowWorkflow";
    type Input = SlowParams;
    type Output = ();

    async fn run(params: Self::Input, mut ctx: WorkflowContext) -> TaskResult<Self::Output> {
        ctx.set_activity_options(ActivityOptions {
            start_to_close_timeout: Duration::from_millis(params.timeout_ms),
        });
        ctx.execute_activity::<SleepActivity>(&params.sleep_ms).await
    }
}

// ============================================================================
// DelayedGreetingWorkflow - Waits before scheduling the greeting activity
// ============================================================================

/// Set once a `DelayedGreetingWorkflow` body starts running.
pub static DELAYED_GREETING_STARTED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayedGreeting {
    pub delay_ms: u64,
    pub name: String,
}

pub struct DelayedGreetingWorkflow;

#[async_trait]
impl Workflow for DelayedGreetingWorkflow {
    const NAME: &'static str = "DelayedGreetingWorkflow";
    type Input = DelayedGreeting;
    type Output = String;

    async fn run(params: Self::Input, mut ctx: WorkflowContext) -> TaskResult<Self::Output> {
        DELAYED_GREETING_STARTED.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(params.delay_ms)).await;
        ctx.execute_activity::<HelloWorldActivity>(&params.name).await
    }
}
