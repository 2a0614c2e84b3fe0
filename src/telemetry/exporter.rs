//! OTLP/gRPC exporters for traces and metrics.

use opentelemetry_otlp::{MetricExporter, SpanExporter, WithExportConfig, WithTonicConfig};
use std::time::Duration;
use tonic::metadata::{AsciiMetadataValue, MetadataKey, MetadataMap};
use tonic::transport::{ClientTlsConfig, Endpoint};

use super::bootstrap::TelemetryError;
use crate::config::{ConfigError, CredentialMode, OtlpConfig};

/// Builds both exporters against the same validated endpoint.
#[derive(Debug, Clone)]
pub struct ExporterFactory {
    endpoint: String,
    metadata: MetadataMap,
    tls: Option<ClientTlsConfig>,
    timeout: Duration,
}

impl ExporterFactory {
    /// Validate the endpoint and headers. Nothing is connected yet.
    pub fn new(config: &OtlpConfig) -> Result<Self, TelemetryError> {
        let endpoint = config.endpoint_url();
        Endpoint::from_shared(endpoint.clone()).map_err(|e| TelemetryError::InvalidEndpoint {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;

        let tls = match config.credentials {
            CredentialMode::Tls => Some(ClientTlsConfig::new().with_native_roots()),
            CredentialMode::Plaintext => None,
        };

        Ok(Self {
            endpoint,
            metadata: metadata_from_headers(config)?,
            tls,
            timeout: config.retry.max_elapsed_time,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn span_exporter(&self) -> Result<SpanExporter, TelemetryError> {
        let mut builder = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(self.endpoint.clone())
            .with_timeout(self.timeout)
            .with_metadata(self.metadata.clone());
        if let Some(tls) = &self.tls {
            builder = builder.with_tls_config(tls.clone());
        }
        Ok(builder.build()?)
    }

    pub fn metric_exporter(&self) -> Result<MetricExporter, TelemetryError> {
        let mut builder = MetricExporter::builder()
            .with_tonic()
            .with_endpoint(self.endpoint.clone())
            .with_timeout(self.timeout)
            .with_metadata(self.metadata.clone());
        if let Some(tls) = &self.tls {
            builder = builder.with_tls_config(tls.clone());
        }
        builder
            .build()
            .map_err(|e| TelemetryError::MetricExporter(e.to_string()))
    }
}

fn metadata_from_headers(config: &OtlpConfig) -> Result<MetadataMap, ConfigError> {
    let mut metadata = MetadataMap::with_capacity(config.headers.len());
    for (name, value) in &config.headers {
        let key = MetadataKey::from_bytes(name.to_ascii_lowercase().as_bytes())
            .map_err(|_| ConfigError::InvalidHeaderName(name.clone()))?;
        let value = AsciiMetadataValue::try_from(value.as_str())
            .map_err(|_| ConfigError::InvalidHeaderValue(name.clone()))?;
        metadata.insert(key, value);
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::collections::HashMap;

    fn config(endpoint: &str) -> OtlpConfig {
        OtlpConfig {
            endpoint: endpoint.to_string(),
            ..OtlpConfig::default()
        }
    }

    #[test]
    fn test_valid_endpoint() {
        let factory = ExporterFactory::new(&config("localhost:4317")).unwrap();
        assert_eq!(factory.endpoint(), "http://localhost:4317");
        assert!(factory.tls.is_none());
        assert_eq!(factory.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let err = ExporterFactory::new(&config("exa mple:4317")).unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidEndpoint { .. }));
    }

    #[test]
    fn test_tls_mode_uses_https() {
        let factory = ExporterFactory::new(&OtlpConfig {
            credentials: CredentialMode::Tls,
            ..config("ingest.example.com:443")
        })
        .unwrap();
        assert_eq!(factory.endpoint(), "https://ingest.example.com:443");
        assert!(factory.tls.is_some());
    }

    #[test]
    fn test_headers_become_metadata() {
        let factory = ExporterFactory::new(&OtlpConfig {
            headers: HashMap::from([("signoz-access-token".to_string(), "abc".to_string())]),
            ..config("localhost:4317")
        })
        .unwrap();
        assert_eq!(
            factory.metadata.get("signoz-access-token").unwrap().to_str().unwrap(),
            "abc"
        );
    }

    #[test]
    fn test_invalid_header_name() {
        let err = ExporterFactory::new(&OtlpConfig {
            headers: HashMap::from([("bad header".to_string(), "x".to_string())]),
            ..config("localhost:4317")
        })
        .unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::Config(ConfigError::InvalidHeaderName(_))
        ));
    }

    #[tokio::test]
    async fn test_exporters_build_without_collector() {
        let factory = ExporterFactory::new(&config("127.0.0.1:4317")).unwrap();
        factory.span_exporter().unwrap();
        factory.metric_exporter().unwrap();
    }
}
