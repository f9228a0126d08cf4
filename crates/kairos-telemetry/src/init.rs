use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// `telemetry.exporter` (§6): `stdout` (default), `otlp`, or `none`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TelemetryExporter {
    #[default]
    Stdout,
    Otlp,
    None,
}

#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub exporter: TelemetryExporter,
    pub otlp_endpoint: Option<String>,
    pub otlp_insecure: bool,
    pub json: bool,
}

/// Installs a `tracing_subscriber::fmt` layer and, when configured, an OTLP
/// layer via `tracing-opentelemetry`. `RUST_LOG`/`KAIROS_LOG_LEVEL` controls
/// verbosity through `EnvFilter`, following the teacher's
/// `tracing_subscriber::fmt().with_env_filter(...)` init idiom.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("KAIROS_LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    match config.exporter {
        TelemetryExporter::None => {
            registry.with(tracing_subscriber::fmt::layer().compact()).init();
        }
        TelemetryExporter::Stdout if config.json => {
            registry.with(tracing_subscriber::fmt::layer().json()).init();
        }
        TelemetryExporter::Stdout => {
            registry.with(tracing_subscriber::fmt::layer().compact()).init();
        }
        TelemetryExporter::Otlp => {
            let endpoint = config
                .otlp_endpoint
                .clone()
                .unwrap_or_else(|| "http://localhost:4317".to_owned());

            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(&endpoint)
                .build()?;

            let provider = opentelemetry_sdk::trace::TracerProvider::builder()
                .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
                .with_resource(Resource::new(vec![KeyValue::new(
                    "service.name",
                    config.service_name.clone(),
                )]))
                .build();

            let tracer = opentelemetry::trace::TracerProvider::tracer(&provider, "kairos");
            opentelemetry::global::set_tracer_provider(provider);

            registry
                .with(tracing_subscriber::fmt::layer().compact())
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .init();
        }
    }

    Ok(())
}
