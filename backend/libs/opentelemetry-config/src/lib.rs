//! OpenTelemetry Configuration Library
//!
//! Centralizes logging, distributed tracing, and trace-context propagation for Nova
//! backend services. Spans are exported over OTLP, which Jaeger, Tempo and other
//! observability backends accept natively.

use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    runtime,
    trace::{RandomIdGenerator, Sampler, Tracer},
    Resource,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod config;
pub mod propagation;

pub use config::{LogFormat, TracingConfig};
pub use propagation::{
    composite_propagator, extract_context, inject_context, HeaderExtractor, HeaderInjector,
    KafkaHeaders,
};

const DEFAULT_FILTER: &str = "info,rdkafka=warn,actix_web=info";

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to install OTLP pipeline: {0}")]
    Pipeline(#[from] opentelemetry::trace::TraceError),

    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Initialize logging and tracing for a service
///
/// Always installs the TraceContext + Baggage propagator and a `fmt` log layer.
/// When `config.enabled` is set, spans are also exported through OTLP and the
/// installed tracer is returned.
///
/// # Example
/// ```no_run
/// use opentelemetry_config::{init_tracing, TracingConfig};
///
/// let _tracer = init_tracing("notification-service", TracingConfig::from_env())
///     .expect("Failed to initialize tracing");
/// ```
pub fn init_tracing(
    service_name: &str,
    config: TracingConfig,
) -> Result<Option<Tracer>, TelemetryError> {
    global::set_text_map_propagator(composite_propagator());

    let tracer = if config.enabled {
        let resource = Resource::new(vec![
            KeyValue::new("service.name", service_name.to_string()),
            KeyValue::new("service.version", config.service_version.clone()),
            KeyValue::new("deployment.environment", config.environment.clone()),
        ]);
        Some(init_otlp_tracer(&config, resource)?)
    } else {
        None
    };

    let telemetry_layer = tracer
        .clone()
        .map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json = config.log_format == LogFormat::Json;
    let json_layer = json.then(|| fmt::layer().json().with_target(true));
    let text_layer = (!json).then(|| fmt::layer().with_target(true).with_level(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(telemetry_layer)
        .try_init()?;

    tracing::info!(
        service = service_name,
        export_enabled = config.enabled,
        sample_rate = config.sample_rate,
        "Tracing initialized"
    );

    Ok(tracer)
}

/// Initialize OTLP exporter (works with Jaeger, Tempo, and other OTLP-compatible backends)
fn init_otlp_tracer(config: &TracingConfig, resource: Resource) -> Result<Tracer, TelemetryError> {
    let endpoint = config
        .otlp_endpoint
        .clone()
        .unwrap_or_else(|| "http://jaeger:4317".to_string());

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint);

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(
            opentelemetry_sdk::trace::config()
                .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                    config.sample_rate,
                ))))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .install_batch(runtime::Tokio)?;

    Ok(tracer)
}

/// Shutdown tracing gracefully
///
/// Call this before shutting down the service to ensure all spans are exported
pub fn shutdown_tracing() {
    global::shutdown_tracer_provider();
}
