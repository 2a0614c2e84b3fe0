//! Tracer and meter providers, and the explicit handle components use to
//! reach them.

use opentelemetry::global;
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::propagation::{TextMapCompositePropagator, TextMapPropagator};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, RandomIdGenerator, Sampler, Tracer, TracerProvider,
};
use opentelemetry_sdk::{Resource, runtime};
use std::sync::Arc;
use std::time::Duration;

use super::INSTRUMENTATION_SCOPE;
use super::metrics::EngineMetrics;

pub const BATCH_SCHEDULED_DELAY: Duration = Duration::from_secs(5);
pub const BATCH_MAX_EXPORT_SIZE: usize = 512;
pub const BATCH_MAX_QUEUE_SIZE: usize = 2048;
pub const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Tracer provider with a batch processor over `exporter`.
pub fn tracer_provider(
    exporter: opentelemetry_otlp::SpanExporter,
    resource: Resource,
) -> TracerProvider {
    let batch_config = BatchConfigBuilder::default()
        .with_scheduled_delay(BATCH_SCHEDULED_DELAY)
        .with_max_export_batch_size(BATCH_MAX_EXPORT_SIZE)
        .with_max_queue_size(BATCH_MAX_QUEUE_SIZE)
        .build();
    let processor = BatchSpanProcessor::builder(exporter, runtime::Tokio)
        .with_batch_config(batch_config)
        .build();

    TracerProvider::builder()
        .with_span_processor(processor)
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build()
}

/// Meter provider with a periodic reader over `exporter`.
pub fn meter_provider(
    exporter: opentelemetry_otlp::MetricExporter,
    resource: Resource,
) -> SdkMeterProvider {
    let reader = PeriodicReader::builder(exporter, runtime::Tokio)
        .with_interval(METRIC_EXPORT_INTERVAL)
        .build();

    SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build()
}

/// W3C trace-context plus baggage.
pub fn composite_propagator() -> TextMapCompositePropagator {
    TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ])
}

/// Explicit handle on the providers and instruments.
///
/// Cheap to clone. The engine client and worker take one of these instead of
/// reaching for the global providers.
#[derive(Clone)]
pub struct TelemetryContext {
    tracer_provider: TracerProvider,
    meter_provider: SdkMeterProvider,
    propagator: Arc<dyn TextMapPropagator + Send + Sync>,
    metrics: EngineMetrics,
}

impl TelemetryContext {
    pub fn new(tracer_provider: TracerProvider, meter_provider: SdkMeterProvider) -> Self {
        let metrics = EngineMetrics::new(&meter_provider.meter(INSTRUMENTATION_SCOPE));
        Self {
            tracer_provider,
            meter_provider,
            propagator: Arc::new(composite_propagator()),
            metrics,
        }
    }

    /// Providers without exporters. Spans and measurements are produced but
    /// go nowhere.
    pub fn noop() -> Self {
        Self::new(
            TracerProvider::builder().build(),
            SdkMeterProvider::builder().build(),
        )
    }

    pub fn tracer(&self, name: &'static str) -> Tracer {
        self.tracer_provider.tracer(name)
    }

    pub fn meter(&self, name: &'static str) -> Meter {
        self.meter_provider.meter(name)
    }

    pub fn tracer_provider(&self) -> &TracerProvider {
        &self.tracer_provider
    }

    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.meter_provider
    }

    pub fn propagator(&self) -> Arc<dyn TextMapPropagator + Send + Sync> {
        self.propagator.clone()
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Install both providers and the composite propagator as process
    /// defaults, replacing whatever was registered before.
    pub fn register_global(&self) {
        global::set_tracer_provider(self.tracer_provider.clone());
        global::set_meter_provider(self.meter_provider.clone());
        global::set_text_map_propagator(composite_propagator());
    }
}

impl std::fmt::Debug for TelemetryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryContext").finish_non_exhaustive()
    }
}
