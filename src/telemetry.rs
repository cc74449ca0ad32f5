use opentelemetry::trace::TraceId;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

/// Fetch an opentelemetry::trace::TraceId as hex through the full tracing stack
pub fn get_trace_id() -> Option<TraceId> {
    use opentelemetry::trace::TraceContextExt as _; // opentelemetry::Context -> opentelemetry::trace::Span
    use tracing_opentelemetry::OpenTelemetrySpanExt as _; // tracing::Span to opentelemetry::Context

    match tracing::Span::current()
        .context()
        .span()
        .span_context()
        .trace_id()
    {
        TraceId::INVALID => None,
        valid => Some(valid),
    }
}

#[cfg(feature = "telemetry")]
async fn init_tracer() -> anyhow::Result<opentelemetry::sdk::trace::Tracer> {
    use anyhow::Context as _;
    use opentelemetry::sdk::{trace, Resource};
    use opentelemetry::KeyValue;

    let otlp_endpoint = std::env::var("OPENTELEMETRY_ENDPOINT_URL")
        .context("Need a otel tracing collector configured via OPENTELEMETRY_ENDPOINT_URL")?;

    let channel = tonic::transport::Channel::from_shared(otlp_endpoint)?
        .connect()
        .await
        .context("Failed to connect to the OTLP collector")?;

    Ok(opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_channel(channel),
        )
        .with_trace_config(trace::config().with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            "shoot-admission",
        )])))
        .install_batch(opentelemetry::runtime::Tokio)?)
}

/// Initialize tracing
pub async fn init() -> anyhow::Result<()> {
    // Setup tracing layers
    #[cfg(feature = "telemetry")]
    let telemetry = tracing_opentelemetry::layer().with_tracer(init_tracer().await?);

    let logger = tracing_subscriber::fmt::layer().compact();
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    // Decide on layers
    #[cfg(feature = "telemetry")]
    let collector = Registry::default()
        .with(telemetry)
        .with(logger)
        .with(env_filter);
    #[cfg(not(feature = "telemetry"))]
    let collector = Registry::default().with(logger).with(env_filter);

    // Initialize tracing
    tracing::subscriber::set_global_default(collector)?;
    Ok(())
}
