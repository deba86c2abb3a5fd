use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;

pub const SERVICE_NAME: &str = "quiz-session-api";

/// Builds the OTLP span pipeline and installs it as the global provider.
/// The returned handle is what `shutdown_telemetry` flushes on exit.
pub fn init_telemetry() -> anyhow::Result<SdkTracerProvider> {
    let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4318".to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(otlp_endpoint)
        .build()?;

    let resource = Resource::builder_empty()
        .with_service_name(SERVICE_NAME)
        .with_attributes(vec![KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        )])
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());

    Ok(provider)
}

/// Exports buffered spans and stops the batch processor.
pub fn shutdown_telemetry(provider: &SdkTracerProvider) -> anyhow::Result<()> {
    tracing::info!("Shutting down OpenTelemetry");
    provider
        .shutdown()
        .map_err(|e| anyhow::anyhow!("OpenTelemetry shutdown failed: {}", e))
}
