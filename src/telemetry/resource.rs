//! Resource attributes shared by the tracer and meter providers.

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions as semconv;

pub const SERVICE_VERSION: &str = "1.0.0";

const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment";
const HOST_NAME: &str = "host.name";
const SERVICE_INSTANCE_ID: &str = "service.instance.id";
const TELEMETRY_SDK_LANGUAGE: &str = "telemetry.sdk.language";

/// Identity of this process as seen by the telemetry backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    pub host_name: String,
    pub instance_id: String,
}

impl ResourceDescriptor {
    /// Read host name and pid from the OS. An unreadable host name becomes
    /// an empty string.
    pub fn detect(service_name: impl Into<String>, environment: impl Into<String>) -> Self {
        let host_name = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_default();
        let instance_id = format!("{}-{}", host_name, std::process::id());

        Self {
            service_name: service_name.into(),
            service_version: SERVICE_VERSION.to_string(),
            environment: environment.into(),
            host_name,
            instance_id,
        }
    }

    pub fn to_resource(&self) -> Resource {
        Resource::from_schema_url(
            [
                KeyValue::new(semconv::resource::SERVICE_NAME, self.service_name.clone()),
                KeyValue::new(
                    semconv::resource::SERVICE_VERSION,
                    self.service_version.clone(),
                ),
                KeyValue::new(DEPLOYMENT_ENVIRONMENT, self.environment.clone()),
                KeyValue::new(HOST_NAME, self.host_name.clone()),
                KeyValue::new(SERVICE_INSTANCE_ID, self.instance_id.clone()),
                KeyValue::new(TELEMETRY_SDK_LANGUAGE, "rust"),
            ],
            semconv::SCHEMA_URL,
        )
    }
}
