use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use super::context::{ActivityContext, WorkflowContext};
use super::payload::Payload;
use crate::error::TaskResult;

/// Defines a workflow with typed input and output.
///
/// Workflow code coordinates activities. It must be deterministic: no I/O, no
/// clocks, no spans. Side effects belong in activities.
///
/// # Example
/// ```ignore
/// struct OrderWorkflow;
///
/// #[async_trait]
/// impl Workflow for OrderWorkflow {
///     const NAME: &'static str = "OrderWorkflow";
///     type Input = OrderId;
///     type Output = Receipt;
///
///     async fn run(input: Self::Input, mut ctx: WorkflowContext) -> TaskResult<Self::Output> {
///         ctx.execute_activity::<ChargeCard>(&input).await
///     }
/// }
/// ```
#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    /// Workflow type name. Must be unique on a task queue.
    const NAME: &'static str;

    /// Input type (must be JSON-serializable)
    type Input: Serialize + DeserializeOwned + Send;

    /// Output type (must be JSON-serializable)
    type Output: Serialize + DeserializeOwned + Send;

    async fn run(input: Self::Input, ctx: WorkflowContext) -> TaskResult<Self::Output>;
}

/// Defines an activity with typed input and output.
///
/// Activities run once per schedule and may do anything, including I/O and
/// emitting telemetry. The [`ActivityContext`] carries the trace context
/// extracted from the task header.
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    /// Activity type name. Must be unique on a task queue.
    const NAME: &'static str;

    type Input: Serialize + DeserializeOwned + Send + Sync;

    type Output: Serialize + DeserializeOwned + Send;

    async fn run(input: Self::Input, ctx: ActivityContext) -> TaskResult<Self::Output>;
}

/// Internal trait for storing heterogeneous workflows in a HashMap.
#[async_trait]
pub(crate) trait ErasedWorkflow: Send + Sync {
    async fn execute(&self, input: Payload, ctx: WorkflowContext) -> TaskResult<Payload>;
}

#[async_trait]
impl<W: Workflow> ErasedWorkflow for PhantomData<W> {
    async fn execute(&self, input: Payload, ctx: WorkflowContext) -> TaskResult<Payload> {
        let typed_input: W::Input = input.decode()?;
        let output = W::run(typed_input, ctx).await?;
        Ok(Payload::encode(&output)?)
    }
}

/// Internal trait for storing heterogeneous activities in a HashMap.
#[async_trait]
pub(crate) trait ErasedActivity: Send + Sync {
    async fn execute(&self, input: Payload, ctx: ActivityContext) -> TaskResult<Payload>;
}

#[async_trait]
impl<A: Activity> ErasedActivity for PhantomData<A> {
    async fn execute(&self, input: Payload, ctx: ActivityContext) -> TaskResult<Payload> {
        let typed_input: A::Input = input.decode()?;
        let output = A::run(typed_input, ctx).await?;
        Ok(Payload::encode(&output)?)
    }
}

pub(crate) type WorkflowRegistry = HashMap<String, Arc<dyn ErasedWorkflow>>;

pub(crate) type ActivityRegistry = HashMap<String, Arc<dyn ErasedActivity>>;
