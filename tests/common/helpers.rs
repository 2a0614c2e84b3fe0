use opentelemetry::KeyValue;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::metrics::data::Sum;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::testing::metrics::InMemoryMetricExporter;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;
use otel_hello_workflow::config::EngineConfig;
use otel_hello_workflow::engine::{Client, LocalEngine};
use otel_hello_workflow::telemetry::{TelemetryContext, TracingContextPropagator};

pub const TEST_QUEUE: &str = "test-task-queue";

/// Telemetry backed by in-memory exporters instead of a collector.
pub struct TestTelemetry {
    pub context: TelemetryContext,
    pub spans: InMemorySpanExporter,
    pub metrics: InMemoryMetricExporter,
}

impl TestTelemetry {
    pub fn new() -> Self {
        let spans = InMemorySpanExporter::default();
        let tracer_provider = TracerProvider::builder()
            .with_simple_exporter(spans.clone())
            .build();

        let metrics = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(metrics.clone(), runtime::Tokio).build();
        let meter_provider = SdkMeterProvider::builder().with_reader(reader).build();

        Self {
            context: TelemetryContext::new(tracer_provider, meter_provider),
            spans,
            metrics,
        }
    }

    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans.get_finished_spans().expect("Failed to read spans")
    }

    /// Force a metrics collection. Must run on a multi-thread runtime.
    pub async fn flush_metrics(&self) {
        let provider = self.context.meter_provider().clone();
        tokio::task::spawn_blocking(move || provider.force_flush())
            .await
            .expect("flush task panicked")
            .expect("Failed to flush metrics");
    }

    /// Sum of all data points of a u64 counter.
    pub fn counter_value(&self, name: &str) -> u64 {
        self.metrics
            .get_finished_metrics()
            .expect("Failed to read metrics")
            .iter()
            .flat_map(|rm| rm.scope_metrics.iter())
            .flat_map(|sm| sm.metrics.iter())
            .filter(|m| m.name == name)
            .filter_map(|m| m.data.as_any().downcast_ref::<Sum<u64>>())
            .flat_map(|sum| sum.data_points.iter())
            .map(|dp| dp.value)
            .max()
            .unwrap_or(0)
    }
}

/// Client on `engine` with the test queue as its default and trace
/// propagation enabled.
pub fn create_client(engine: &LocalEngine, telemetry: &TestTelemetry) -> Client {
    Client::builder()
        .engine(engine.clone())
        .config(EngineConfig {
            task_queue: TEST_QUEUE.to_string(),
            ..EngineConfig::default()
        })
        .propagator(TracingContextPropagator::new(telemetry.context.propagator()))
        .telemetry(telemetry.context.clone())
        .build()
        .expect("Failed to create client")
}

pub fn find_span<'a>(spans: &'a [SpanData], name: &str) -> &'a SpanData {
    spans
        .iter()
        .find(|span| span.name == name)
        .unwrap_or_else(|| panic!("no span named {name}"))
}

pub fn attribute(span: &SpanData, key: &str) -> Option<String> {
    span.attributes
        .iter()
        .find(|kv: &&KeyValue| kv.key.as_str() == key)
        .map(|kv| kv.value.as_str().to_string())
}

/// Lookup that never finds anything.
pub fn no_env(_: &str) -> Option<String> {
    None
}
