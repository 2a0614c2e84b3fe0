//! W3C Trace Context propagation across the client/worker boundary.
//!
//! The client injects the caller's context when it starts a workflow; the
//! worker extracts it before running an activity, so activity spans join the
//! starter's trace. Only the `traceparent` entry is carried, encoded as a
//! string payload under the header key of the same name:
//! `traceparent: 00-{trace_id}-{span_id}-{flags}`

use opentelemetry::Context;
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::{
    ContextPropagator, HeaderReader, HeaderWriter, Payload, WorkflowContext,
};
use crate::error::PayloadError;

/// Header key holding the W3C trace parent
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Flat string map moved between the tracing context and a task header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceCarrier(HashMap<String, String>);

impl TraceCarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Injector for TraceCarrier {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_string(), value);
    }
}

impl Extractor for TraceCarrier {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// [`ContextPropagator`] backed by an OpenTelemetry text-map propagator.
#[derive(Clone)]
pub struct TracingContextPropagator {
    propagator: Arc<dyn TextMapPropagator + Send + Sync>,
}

impl TracingContextPropagator {
    pub fn new(propagator: Arc<dyn TextMapPropagator + Send + Sync>) -> Self {
        Self { propagator }
    }

    /// Plain W3C trace-context propagation.
    pub fn w3c() -> Self {
        Self::new(Arc::new(TraceContextPropagator::new()))
    }
}

impl ContextPropagator for TracingContextPropagator {
    fn inject(&self, cx: &Context, writer: &mut dyn HeaderWriter) -> Result<(), PayloadError> {
        let mut carrier = TraceCarrier::new();
        self.propagator.inject_context(cx, &mut carrier);

        // No active span: nothing to carry
        if let Some(traceparent) = carrier.get(TRACEPARENT_HEADER) {
            writer.set(TRACEPARENT_HEADER, Payload::encode(traceparent)?);
        }
        Ok(())
    }

    fn extract(&self, cx: &Context, reader: &dyn HeaderReader) -> Result<Context, PayloadError> {
        let mut carrier = TraceCarrier::new();
        reader.for_each_key(&mut |key, payload| {
            if key == TRACEPARENT_HEADER {
                let traceparent: String = payload.decode()?;
                carrier.set(key, traceparent);
            }
            Ok(())
        })?;

        if carrier.is_empty() {
            return Ok(cx.clone());
        }
        Ok(self.propagator.extract_with_context(cx, &carrier))
    }

    // Workflow code may be replayed, so it must not start or continue live
    // spans. Trace continuity ends at the client/worker boundary.
    fn inject_from_workflow(
        &self,
        _ctx: &WorkflowContext,
        _writer: &mut dyn HeaderWriter,
    ) -> Result<(), PayloadError> {
        Ok(())
    }

    fn extract_to_workflow(
        &self,
        _ctx: &mut WorkflowContext,
        _reader: &dyn HeaderReader,
    ) -> Result<(), PayloadError> {
        Ok(())
    }
}

/// Check if a header carries trace context.
pub fn has_trace_context(reader: &dyn HeaderReader) -> bool {
    reader.get(TRACEPARENT_HEADER).is_some()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::engine::{Header, LocalEngine, WorkflowInfo};
    use chrono::Utc;
    use opentelemetry::trace::{
        SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
    };
    use uuid::Uuid;

    const TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
    const SPAN_ID: &str = "00f067aa0ba902b7";

    fn remote_context() -> Context {
        let span_context = SpanContext::new(
            TraceId::from_hex(TRACE_ID).unwrap(),
            SpanId::from_hex(SPAN_ID).unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        Context::new().with_remote_span_context(span_context)
    }

    fn workflow_context(header: Header) -> WorkflowContext {
        WorkflowContext::new(
            WorkflowInfo {
                workflow_id: "wf".to_string(),
                run_id: Uuid::new_v4(),
                workflow_type: "HelloWorldWorkflow".to_string(),
                task_queue: "q".to_string(),
                namespace: "default".to_string(),
                started_at: Utc::now(),
            },
            header,
            LocalEngine::new(),
            Arc::from(Vec::new()),
        )
    }

    #[test]
    fn test_inject_extract_roundtrip() {
        let propagator = TracingContextPropagator::w3c();
        let mut header = Header::new();
        propagator.inject(&remote_context(), &mut header).unwrap();

        assert!(has_trace_context(&header));
        let traceparent: String = header.get(TRACEPARENT_HEADER).unwrap().decode().unwrap();
        assert_eq!(traceparent, format!("00-{TRACE_ID}-{SPAN_ID}-01"));

        let cx = propagator.extract(&Context::new(), &header).unwrap();
        let span_context = cx.span().span_context().clone();
        assert!(span_context.is_valid());
        assert!(span_context.is_remote());
        assert_eq!(span_context.trace_id(), TraceId::from_hex(TRACE_ID).unwrap());
        assert_eq!(span_context.span_id(), SpanId::from_hex(SPAN_ID).unwrap());
    }

    #[test]
    fn test_inject_without_span_writes_nothing() {
        let propagator = TracingContextPropagator::w3c();
        let mut header = Header::new();
        propagator.inject(&Context::new(), &mut header).unwrap();
        assert!(header.is_empty());
        assert!(!has_trace_context(&header));
    }

    #[test]
    fn test_extract_without_key_returns_input_context() {
        let propagator = TracingContextPropagator::w3c();
        let mut header = Header::new();
        header.set("unrelated", Payload::encode("x").unwrap());

        let cx = propagator.extract(&Context::new(), &header).unwrap();
        assert!(!cx.span().span_context().is_valid());
    }

    #[test]
    fn test_extract_malformed_payload_fails() {
        let propagator = TracingContextPropagator::w3c();
        let mut header = Header::new();
        header.set(
            TRACEPARENT_HEADER,
            Payload {
                metadata: HashMap::new(),
                data: b"\xff not json".to_vec(),
            },
        );

        let err = propagator.extract(&Context::new(), &header).unwrap_err();
        assert!(matches!(err, PayloadError::Decode(_)));
    }

    #[test]
    fn test_workflow_hooks_are_noops() {
        let propagator = TracingContextPropagator::w3c();
        let mut inherited = Header::new();
        propagator.inject(&remote_context(), &mut inherited).unwrap();

        let mut ctx = workflow_context(inherited.clone());
        let mut outgoing = Header::new();
        propagator.inject_from_workflow(&ctx, &mut outgoing).unwrap();
        assert!(outgoing.is_empty());

        propagator.extract_to_workflow(&mut ctx, &inherited).unwrap();
        assert_eq!(ctx.header(), &inherited);
    }

    #[test]
    fn test_carrier_keys() {
        let mut carrier = TraceCarrier::new();
        carrier.set("key1", "value1".to_string());
        carrier.set("key2", "value2".to_string());

        let keys = carrier.keys();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"key1"));
        assert!(keys.contains(&"key2"));
    }
}
