use crate::cli::{actions::Action, commands, dispatch::handler};
use anyhow::Result;
use opentelemetry::{trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace::TracerProvider, Resource};
use std::time::Duration;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Start the CLI
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    let verbosity_level = match matches.get_one::<u8>("verbosity").map_or(0, |&v| v) {
        0 => tracing::Level::ERROR,
        1 => tracing::Level::WARN,
        2 => tracing::Level::INFO,
        3 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let fmt_layer = fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false);

    // RUST_LOG=
    let env_filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.into())
        .from_env_lossy();

    let subscriber = Registry::default().with(fmt_layer).with(env_filter);

    // Traces are exported only when a collector endpoint is configured, so a
    // plain local run does not need one.
    if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let otlp_exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_timeout(Duration::from_secs(3))
            .build()?;

        let provider = TracerProvider::builder()
            .with_batch_exporter(otlp_exporter, runtime::Tokio)
            .with_resource(Resource::new(vec![
                KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ]))
            .build();

        let tracer = provider.tracer(env!("CARGO_PKG_NAME"));

        let telemetry = OpenTelemetryLayer::new(tracer);

        tracing::subscriber::set_global_default(subscriber.with(telemetry))?;
    } else {
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let action = handler(&matches)?;

    Ok(action)
}
