//! Tracing subscriber setup, with optional OpenTelemetry export.
//!
//! Without an OTLP endpoint only the fmt layer is installed. With one, traces,
//! logs and metrics are exported over gRPC as well.

use std::time::Duration;

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_sdk::logs::{BatchLogProcessor, SdkLoggerProvider};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{BatchSpanProcessor, RandomIdGenerator, Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Upper bound on each OTLP export call.
const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_FILTER: &str = "info,maestro=debug";

const SERVICE_NAME: &str = "maestro";

/// Build the filter from a configured directive, falling back to the default
/// when the directive does not parse.
pub fn env_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Console logging only.
pub fn init_console(log_level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

fn otlp_url(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    }
}

fn service_resource() -> Resource {
    Resource::builder_empty()
        .with_service_name(SERVICE_NAME)
        .with_attributes(vec![KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        )])
        .build()
}

fn tracer_provider(url: &str, resource: Resource) -> Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(url)
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .context("Failed to create OTLP span exporter")?;

    Ok(SdkTracerProvider::builder()
        .with_span_processor(BatchSpanProcessor::builder(exporter).build())
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build())
}

fn logger_provider(url: &str, resource: Resource) -> Result<SdkLoggerProvider> {
    let exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(url)
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .context("Failed to create OTLP log exporter")?;

    Ok(SdkLoggerProvider::builder()
        .with_log_processor(BatchLogProcessor::builder(exporter).build())
        .with_resource(resource)
        .build())
}

fn meter_provider(url: &str, resource: Resource) -> Result<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(url)
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .context("Failed to create OTLP metric exporter")?;

    Ok(SdkMeterProvider::builder()
        .with_reader(PeriodicReader::builder(exporter).build())
        .with_resource(resource)
        .build())
}

/// Console logging plus OTLP export of traces, logs and metrics to `otlp_endpoint`.
/// A bare `host:port` is taken as plain http.
pub fn init(otlp_endpoint: &str, log_level: &str) -> Result<()> {
    let url = otlp_url(otlp_endpoint);
    let resource = service_resource();

    let tracers = tracer_provider(&url, resource.clone())?;
    let loggers = logger_provider(&url, resource.clone())?;
    global::set_meter_provider(meter_provider(&url, resource)?);

    let tracer = tracers.tracer(SERVICE_NAME);
    global::set_tracer_provider(tracers);

    tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(OpenTelemetryTracingBridge::new(&loggers))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!("🔭 Exporting telemetry to {}", url);
    Ok(())
}

/// Providers flush on drop (bounded by the export timeout); this only marks
/// the point in the log.
pub fn shutdown() {
    tracing::info!("🔭 Shutting down telemetry");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_directive_falls_back() {
        let filter = env_filter("maestro=[[[");
        assert_eq!(filter.to_string(), EnvFilter::new(DEFAULT_FILTER).to_string());
    }

    #[test]
    fn bare_endpoint_gets_http_scheme() {
        assert_eq!(otlp_url("127.0.0.1:4317"), "http://127.0.0.1:4317");
        assert_eq!(otlp_url("https://otel:4317"), "https://otel:4317");
    }

    #[test]
    fn plain_level_is_accepted() {
        assert_eq!(env_filter("warn").to_string(), "warn");
    }
}
