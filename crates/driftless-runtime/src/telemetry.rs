//! Logging and trace export for the localization node.
//!
//! [`init_tracing`] installs the process-wide subscriber described by the
//! `[log]` section of [`Config`][crate::Config]:
//!
//! ```toml
//! [log]
//! filter = "info,driftless_localization=debug"
//! format = "json"
//! ```
//!
//! `RUST_LOG`, when set, replaces `filter`.  Setting
//! `OTEL_EXPORTER_OTLP_ENDPOINT` additionally forwards spans to an OTLP/HTTP
//! collector under the given service name.

use driftless_types::LocalizationError;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use serde::{Deserialize, Serialize};
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Layered;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt};

/// Output format of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human readable output.
    #[default]
    Compact,
    /// Newline-delimited JSON, one object per event.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = LocalizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(LocalizationError::InvalidConfig(format!(
                "unknown log format {other:?} (expected \"compact\" or \"json\")"
            ))),
        }
    }
}

/// The `[log]` config table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directives, e.g. `"info,driftless_localization=debug"`.
    #[serde(default = "default_filter")]
    pub filter: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::default(),
        }
    }
}

impl LogConfig {
    pub fn validate(&self) -> Result<(), LocalizationError> {
        self.parse_filter().map(drop)
    }

    /// `RUST_LOG` if it parses, otherwise the configured directives.
    fn env_filter(&self) -> Result<EnvFilter, LocalizationError> {
        EnvFilter::try_from_default_env().or_else(|_| self.parse_filter())
    }

    fn parse_filter(&self) -> Result<EnvFilter, LocalizationError> {
        EnvFilter::try_new(&self.filter).map_err(|e| {
            LocalizationError::InvalidConfig(format!("invalid log filter {:?}: {e}", self.filter))
        })
    }
}

/// Formatting layer for `format`, writing through `writer`.
pub fn fmt_layer<S, W>(format: LogFormat, writer: W) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer().with_writer(writer);
    match format {
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Assemble the subscriber [`init_tracing`] installs, without installing it.
///
/// `export` is the optional span-export layer sitting directly on the
/// registry.
pub fn subscriber<L, W>(
    filter: EnvFilter,
    format: LogFormat,
    writer: W,
    export: Option<L>,
) -> impl Subscriber + Send + Sync + 'static
where
    L: Layer<Registry> + Send + Sync + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    type Filtered<E> = Layered<EnvFilter, Layered<Option<E>, Registry>>;
    tracing_subscriber::registry()
        .with(export)
        .with(filter)
        .with(fmt_layer::<Filtered<L>, W>(format, writer))
}

/// Install the global subscriber for `service_name` according to `config`.
///
/// Hold the returned guard for the lifetime of the process; dropping it
/// flushes pending spans.  Fails if a global subscriber is already set.
pub fn init_tracing(
    service_name: &str,
    config: &LogConfig,
) -> Result<TracerProviderGuard, LocalizationError> {
    let filter = config.env_filter()?;
    let provider = build_provider(service_name);
    let export = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(service_name.to_string())));

    subscriber(filter, config.format, std::io::stdout, export).try_init().map_err(|e| {
        LocalizationError::InvalidConfig(format!("tracing already initialised: {e}"))
    })?;
    Ok(TracerProviderGuard(provider))
}

/// Shuts the OTLP tracer provider down on drop.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[driftless] trace provider shutdown failed: {e}");
        }
    }
}

/// `None` unless `OTEL_EXPORTER_OTLP_ENDPOINT` is set and the exporter builds.
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[driftless] OTLP exporter init failed: {e}"))
        .ok()?;

    // Simple (synchronous) export: the node may start before any runtime.
    Some(
        SdkTracerProvider::builder()
            .with_resource(Resource::builder().with_service_name(service_name.to_string()).build())
            .with_simple_exporter(exporter)
            .build(),
    )
}
