use std::time::Duration;

use opentelemetry::trace::{TraceError, TraceId, TracerProvider as _};
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{self, Sampler, Tracer};
use opentelemetry_sdk::Resource;
use thiserror::Error;
use tracing::dispatcher::SetGlobalDefaultError;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Registry};

const SERVICE_NAME: &str = "schema-listener";
const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum Error {
    /// The OTLP trace exporter could not be installed.
    #[error("failed to install the OTLP trace exporter: {0}")]
    Exporter(#[source] TraceError),

    /// Something else already installed a global subscriber.
    #[error("global subscriber already installed: {0}")]
    AlreadyInitialized(#[source] SetGlobalDefaultError),
}

/// Log output format, selectable on the command line.
#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum LogFormat {
    Json,
    Text,
}

/// Trace id of the current span, [`TraceId::INVALID`] when tracing is off.
///
/// Crosses from the `tracing` span into its OpenTelemetry context; the
/// reconcilers record it on their spans and attach it to duration metrics
/// as an exemplar.
pub fn get_trace_id() -> TraceId {
    use opentelemetry::trace::TraceContextExt as _;
    use tracing_opentelemetry::OpenTelemetrySpanExt as _;

    tracing::Span::current()
        .context()
        .span()
        .span_context()
        .trace_id()
}

/// Installs the global `tracing` subscriber.
///
/// The filter directive and format always apply to log output; when
/// `tracing_url` is set, spans are additionally exported over OTLP/gRPC,
/// sampled at `trace_ratio` for new traces and following the parent
/// decision for propagated ones.
///
/// ```no_run
/// # use schema_listener::telemetry::{self, LogFormat};
/// # #[tokio::main]
/// # async fn main() -> Result<(), telemetry::Error> {
/// telemetry::init("info,kube=warn", LogFormat::Json, None, 0.1).await?;
/// # Ok(())
/// # }
/// ```
pub async fn init(
    log_filter: &str,
    log_format: LogFormat,
    tracing_url: Option<&str>,
    trace_ratio: f64,
) -> Result<(), Error> {
    let base = Registry::default()
        .with(EnvFilter::new(log_filter))
        .with(fmt_layer(log_format));

    match tracing_url {
        Some(url) => {
            let tracer = otlp_tracer(url, trace_ratio)?;
            tracing::subscriber::set_global_default(base.with(OpenTelemetryLayer::new(tracer)))
        }
        None => tracing::subscriber::set_global_default(base),
    }
    .map_err(Error::AlreadyInitialized)
}

fn fmt_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span>,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer().compact().boxed(),
    }
}

fn otlp_tracer(url: &str, trace_ratio: f64) -> Result<Tracer, Error> {
    let provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(url)
                .with_timeout(EXPORT_TIMEOUT),
        )
        .with_trace_config(
            trace::Config::default()
                .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                    trace_ratio,
                ))))
                .with_resource(Resource::new([
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)
        .map_err(Error::Exporter)?;
    Ok(provider.tracer(SERVICE_NAME))
}
