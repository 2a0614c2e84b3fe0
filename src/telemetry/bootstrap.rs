//! Telemetry initialization and ordered shutdown.

use opentelemetry::trace::TraceError;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::TracerProvider;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use super::INSTRUMENTATION_SCOPE;
use super::exporter::ExporterFactory;
use super::provider::{self, TelemetryContext};
use super::resource::ResourceDescriptor;
use crate::config::{ConfigError, OtlpConfig};

/// Default time allowed for flushing and closing both providers.
pub const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// Error type for telemetry initialization failures.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Invalid OTLP endpoint `{endpoint}`: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("Failed to initialize OTLP span exporter: {0}")]
    TraceExporter(#[from] TraceError),
    #[error("Failed to initialize OTLP metric exporter: {0}")]
    MetricExporter(String),
    #[error("Failed to set global subscriber: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
}

/// Lifecycle of a telemetry bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    ShuttingDown = 3,
    Closed = 4,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Lifecycle::Initializing,
            2 => Lifecycle::Ready,
            3 => Lifecycle::ShuttingDown,
            4 => Lifecycle::Closed,
            _ => Lifecycle::Uninitialized,
        }
    }
}

/// Shared view of a [`Lifecycle`] that outlives the [`Telemetry`] value.
#[derive(Debug, Clone)]
pub struct LifecycleState(Arc<AtomicU8>);

impl LifecycleState {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(Lifecycle::Uninitialized as u8)))
    }

    pub fn current(&self) -> Lifecycle {
        Lifecycle::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: Lifecycle) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Builder for configuring telemetry.
///
/// # Example
///
/// ```ignore
/// let telemetry = TelemetryBuilder::from_env().build()?;
/// // ...
/// telemetry.shutdown(DEFAULT_SHUTDOWN_DEADLINE).await;
/// ```
pub struct TelemetryBuilder {
    config: OtlpConfig,
    install_subscriber: bool,
}

impl Default for TelemetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryBuilder {
    /// Create a new telemetry builder with default settings.
    pub fn new() -> Self {
        Self {
            config: OtlpConfig::default(),
            install_subscriber: true,
        }
    }

    /// Builder configured from `OTEL_*` environment variables.
    pub fn from_env() -> Self {
        Self::new().config(OtlpConfig::from_env())
    }

    pub fn config(mut self, config: OtlpConfig) -> Self {
        self.config = config;
        self
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = name.into();
        self
    }

    /// Set the OTLP endpoint. `http://` and `https://` prefixes are honored.
    pub fn otlp_endpoint(mut self, endpoint: &str) -> Self {
        let (endpoint, credentials) = crate::config::normalize_endpoint(endpoint);
        self.config.endpoint = endpoint;
        self.config.credentials = credentials;
        self
    }

    /// Whether to install the global `tracing` subscriber. On by default.
    pub fn install_subscriber(mut self, install: bool) -> Self {
        self.install_subscriber = install;
        self
    }

    /// Build and initialize the telemetry subsystems.
    ///
    /// This will:
    /// 1. Describe the resource
    /// 2. Validate the exporter configuration and build both exporters
    /// 3. Build the tracer and meter providers
    /// 4. Install the tracing subscriber (if enabled)
    /// 5. Register the providers and the propagator as process defaults
    ///
    /// Global registration happens last, so an error leaves no provider
    /// registered.
    pub fn build(self) -> Result<Telemetry, TelemetryError> {
        let lifecycle = LifecycleState::new();
        lifecycle.set(Lifecycle::Initializing);

        let resource =
            ResourceDescriptor::detect(&self.config.service_name, &self.config.environment)
                .to_resource();

        let exporters = ExporterFactory::new(&self.config)?;
        let span_exporter = exporters.span_exporter()?;
        let metric_exporter = exporters.metric_exporter()?;

        let tracer_provider = provider::tracer_provider(span_exporter, resource.clone());
        let meter_provider = provider::meter_provider(metric_exporter, resource);
        let context = TelemetryContext::new(tracer_provider, meter_provider);

        if self.install_subscriber {
            install_subscriber(&context)?;
        }

        context.register_global();
        lifecycle.set(Lifecycle::Ready);

        tracing::info!(
            endpoint = exporters.endpoint(),
            service_name = %self.config.service_name,
            "Telemetry initialized"
        );

        Ok(Telemetry { context, lifecycle })
    }
}

fn install_subscriber(context: &TelemetryContext) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer();
    let otel_layer =
        tracing_opentelemetry::layer().with_tracer(context.tracer(INSTRUMENTATION_SCOPE));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;
    Ok(())
}

/// Initialized telemetry.
///
/// Call [`shutdown`](Self::shutdown) to flush pending spans and metrics; it
/// is the only way to close the providers.
pub struct Telemetry {
    context: TelemetryContext,
    lifecycle: LifecycleState,
}

impl Telemetry {
    pub fn context(&self) -> &TelemetryContext {
        &self.context
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle.clone()
    }

    /// Flush and close the tracer provider, then the meter provider.
    pub async fn shutdown(self, deadline: Duration) -> ShutdownReport {
        self.lifecycle.set(Lifecycle::ShuttingDown);

        let report = ShutdownSequence::new()
            .step(self.context.tracer_provider().clone())
            .step(self.context.meter_provider().clone())
            .run(deadline)
            .await;

        self.lifecycle.set(Lifecycle::Closed);
        report
    }
}

/// One provider (or anything else) closed during shutdown.
pub trait ShutdownStep: Send + 'static {
    fn name(&self) -> &'static str;

    /// Blocking flush-and-close.
    fn close(&self) -> anyhow::Result<()>;
}

impl ShutdownStep for TracerProvider {
    fn name(&self) -> &'static str {
        "tracer provider"
    }

    fn close(&self) -> anyhow::Result<()> {
        Ok(self.shutdown()?)
    }
}

impl ShutdownStep for SdkMeterProvider {
    fn name(&self) -> &'static str {
        "meter provider"
    }

    fn close(&self) -> anyhow::Result<()> {
        Ok(self.shutdown()?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownFailure {
    pub step: &'static str,
    pub reason: String,
}

/// What happened during shutdown. Failures are reported here, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Steps in the order they were started.
    pub attempted: Vec<&'static str>,
    pub failures: Vec<ShutdownFailure>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Ordered list of steps run under one absolute deadline.
///
/// Every step is started even if an earlier one failed or ran out the
/// deadline. Steps run on their own threads so a hung close cannot block
/// the runtime or process exit.
#[derive(Default)]
pub struct ShutdownSequence {
    steps: Vec<Box<dyn ShutdownStep>>,
}

impl ShutdownSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: impl ShutdownStep) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub async fn run(self, deadline: Duration) -> ShutdownReport {
        let deadline_at = Instant::now() + deadline;
        let mut report = ShutdownReport::default();

        for step in self.steps {
            let name = step.name();
            report.attempted.push(name);

            let (tx, rx) = oneshot::channel();
            let spawned = std::thread::Builder::new()
                .name(format!("shutdown-{}", name.replace(' ', "-")))
                .spawn(move || {
                    let _ = tx.send(step.close());
                });
            if let Err(e) = spawned {
                tracing::error!("Failed to start shutdown of {}: {}", name, e);
                report.failures.push(ShutdownFailure {
                    step: name,
                    reason: e.to_string(),
                });
                continue;
            }

            let reason = match tokio::time::timeout_at(deadline_at, rx).await {
                Ok(Ok(Ok(()))) => {
                    tracing::debug!("Shut down {}", name);
                    continue;
                }
                Ok(Ok(Err(e))) => e.to_string(),
                Ok(Err(_)) => "shutdown thread panicked".to_string(),
                Err(_) => format!("deadline of {deadline:?} exceeded"),
            };
            tracing::error!("Failed to shutdown {}: {}", name, reason);
            report.failures.push(ShutdownFailure { step: name, reason });
        }

        report
    }
}
