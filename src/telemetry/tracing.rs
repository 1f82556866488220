use anyhow::Result;
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    runtime,
    trace::{RandomIdGenerator, Sampler, Tracer},
    Resource,
};
use tracing::info;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::TelemetryConfig;

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub service_name: String,

    /// Default filter, RUST_LOG takes precedence
    pub log_level: String,

    pub json_logs: bool,

    /// OTLP endpoint (if set, enables span export)
    pub otlp_endpoint: Option<String>,

    /// Sample rate (0.0 - 1.0)
    pub sample_rate: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "siprouted".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            otlp_endpoint: None,
            sample_rate: 1.0,
        }
    }
}

impl From<&TelemetryConfig> for TracingConfig {
    fn from(config: &TelemetryConfig) -> Self {
        Self {
            log_level: config.log_level.clone(),
            json_logs: config.json_logs,
            otlp_endpoint: config.otlp_endpoint.clone(),
            sample_rate: config.trace_sample_rate,
            ..Self::default()
        }
    }
}

/// Install the global subscriber: env filter, pretty or JSON output and an
/// optional OTLP span exporter.
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let otel_layer = match config.otlp_endpoint.as_deref() {
        Some(endpoint) => Some(OpenTelemetryLayer::new(init_otlp_tracer(config, endpoint)?)),
        None => None,
    };

    let subscriber = tracing_subscriber::registry().with(env_filter).with(otel_layer);

    if config.json_logs {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()?;
    } else {
        subscriber
            .with(fmt::layer().with_span_events(FmtSpan::CLOSE).with_target(true))
            .try_init()?;
    }

    info!(
        service = %config.service_name,
        log_level = %config.log_level,
        json_logs = config.json_logs,
        otlp = config.otlp_endpoint.is_some(),
        "tracing initialized"
    );

    Ok(())
}

fn init_otlp_tracer(config: &TracingConfig, endpoint: &str) -> Result<Tracer> {
    let resource = Resource::new([
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]);

    let sampler = if config.sample_rate >= 1.0 {
        Sampler::AlwaysOn
    } else if config.sample_rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(config.sample_rate)
    };

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_sampler(sampler)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());

    Ok(provider.tracer("siprouted"))
}

/// Flush pending spans
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
    info!("tracing shutdown complete");
}
