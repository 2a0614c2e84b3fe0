use opentelemetry::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::context::WorkflowContext;
use super::payload::Payload;
use crate::error::PayloadError;

/// Write access to a task header.
pub trait HeaderWriter {
    fn set(&mut self, key: &str, value: Payload);
}

/// Read access to a task header.
pub trait HeaderReader {
    fn get(&self, key: &str) -> Option<&Payload>;

    /// Visit every entry, stopping at the first error.
    fn for_each_key(
        &self,
        visit: &mut dyn FnMut(&str, &Payload) -> Result<(), PayloadError>,
    ) -> Result<(), PayloadError>;
}

/// Key-to-payload map carried with every workflow and activity task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    fields: HashMap<String, Payload>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }
}

impl HeaderWriter for Header {
    fn set(&mut self, key: &str, value: Payload) {
        self.fields.insert(key.to_string(), value);
    }
}

impl HeaderReader for Header {
    fn get(&self, key: &str) -> Option<&Payload> {
        self.fields.get(key)
    }

    fn for_each_key(
        &self,
        visit: &mut dyn FnMut(&str, &Payload) -> Result<(), PayloadError>,
    ) -> Result<(), PayloadError> {
        for (key, value) in &self.fields {
            visit(key, value)?;
        }
        Ok(())
    }
}

/// Carries context across the client/worker boundary through task headers.
///
/// The client calls [`inject`](Self::inject) when it starts a workflow and the
/// worker calls [`extract`](Self::extract) before running an activity. The
/// workflow hooks run inside workflow code, which the engine may replay.
pub trait ContextPropagator: Send + Sync {
    /// Write `cx` into the header.
    fn inject(&self, cx: &Context, writer: &mut dyn HeaderWriter) -> Result<(), PayloadError>;

    /// Build a context from the header on top of `cx`.
    fn extract(&self, cx: &Context, reader: &dyn HeaderReader) -> Result<Context, PayloadError>;

    /// Called when a workflow schedules an activity.
    fn inject_from_workflow(
        &self,
        ctx: &WorkflowContext,
        writer: &mut dyn HeaderWriter,
    ) -> Result<(), PayloadError>;

    /// Called before a workflow body runs.
    fn extract_to_workflow(
        &self,
        ctx: &mut WorkflowContext,
        reader: &dyn HeaderReader,
    ) -> Result<(), PayloadError>;
}
