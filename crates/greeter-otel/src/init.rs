use anyhow::Context as _;
use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{Protocol, WithExportConfig as _};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider, Tracer};
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::propagation::ensure_propagator_installed;

const LOCAL_COLLECTOR: &str = "http://127.0.0.1:4318";

#[derive(Debug, Clone)]
pub struct TracingInitOptions<'a> {
    pub service_name: &'a str,
    pub service_version: &'a str,
    /// Used when `RUST_LOG` is unset or unparsable.
    pub default_env_filter: &'a str,
}

/// Resolved OTLP/HTTP export targets. `None` from [`OtlpSettings::resolve`]
/// means export is off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtlpSettings {
    pub traces_endpoint: String,
    pub metrics_endpoint: String,
}

impl OtlpSettings {
    pub fn from_env() -> Option<Self> {
        Self::resolve(|name| std::env::var(name).ok())
    }

    /// Per-signal variables win over the shared base endpoint.
    pub fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let base = var("OTEL_EXPORTER_OTLP_ENDPOINT");
        let forced = var("GREETER_OTEL").is_some_and(|v| is_truthy(&v));
        if base.is_none() && !forced {
            return None;
        }
        let base = base.unwrap_or_else(|| LOCAL_COLLECTOR.to_string());
        let base = base.trim_end_matches('/');

        Some(Self {
            traces_endpoint: var("OTEL_EXPORTER_OTLP_TRACES_ENDPOINT")
                .unwrap_or_else(|| format!("{base}/v1/traces")),
            metrics_endpoint: var("OTEL_EXPORTER_OTLP_METRICS_ENDPOINT")
                .unwrap_or_else(|| format!("{base}/v1/metrics")),
        })
    }
}

fn is_truthy(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(opts: TracingInitOptions<'_>) -> anyhow::Result<()> {
    ensure_propagator_installed();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(opts.default_env_filter));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter).with(fmt_layer);

    let Some(otlp) = OtlpSettings::from_env() else {
        return registry
            .try_init()
            .context("install tracing subscriber");
    };

    let resource = Resource::builder()
        .with_service_name(opts.service_name.to_string())
        .with_attributes([KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
            opts.service_version.to_string(),
        )])
        .build();

    let spans = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(otlp.traces_endpoint)
        .build()
        .context("build otlp span exporter")?;
    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(spans)
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
        .with_resource(resource.clone())
        .build();
    opentelemetry::global::set_tracer_provider(tracer_provider.clone());

    let metrics = opentelemetry_otlp::MetricExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(otlp.metrics_endpoint)
        .build()
        .context("build otlp metric exporter")?;
    opentelemetry::global::set_meter_provider(
        SdkMeterProvider::builder()
            .with_periodic_exporter(metrics)
            .with_resource(resource)
            .build(),
    );

    registry
        .with(span_layer(&tracer_provider, opts.service_name))
        .try_init()
        .context("install tracing subscriber")
}

fn span_layer<S>(provider: &SdkTracerProvider, service_name: &str) -> OpenTelemetryLayer<S, Tracer>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    tracing_opentelemetry::layer().with_tracer(provider.tracer(service_name.to_string()))
}
