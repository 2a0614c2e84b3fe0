//! A failed bootstrap leaves no provider registered.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use opentelemetry::global;
use opentelemetry::trace::{Span as _, Tracer as _};
use otel_hello_workflow::telemetry::{TelemetryBuilder, TelemetryError};

#[tokio::test]
async fn test_invalid_endpoint_fails_without_registering() {
    let result = TelemetryBuilder::new()
        .otlp_endpoint("http://exa mple:4317")
        .install_subscriber(false)
        .build();

    match result {
        Err(TelemetryError::InvalidEndpoint { endpoint, .. }) => {
            assert!(endpoint.contains("exa mple"));
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("bootstrap accepted an invalid endpoint"),
    }

    let mut span = global::tracer("bootstrap-failure-test").start("after-bootstrap");
    assert!(!span.span_context().is_valid());
    span.end();
}
