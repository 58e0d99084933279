//! W3C `traceparent` propagation over HTTP headers.

use std::sync::Once;

use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};
use opentelemetry::Context;
use opentelemetry::propagation::{Extractor, Injector};
use opentelemetry::trace::TraceContextExt as _;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use tracing_opentelemetry::OpenTelemetrySpanExt as _;

static PROPAGATOR: Once = Once::new();

pub(crate) fn ensure_propagator_installed() {
    PROPAGATOR.call_once(|| {
        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());
    });
}

/// Write the current span's trace context into outgoing request headers.
///
/// No-op when the current span carries no valid OTel context.
pub fn inject_trace_headers(headers: &mut HeaderMap) {
    ensure_propagator_installed();

    let cx = tracing::Span::current().context();
    if !cx.span().span_context().is_valid() {
        return;
    }
    opentelemetry::global::get_text_map_propagator(|p| {
        p.inject_context(&cx, &mut Carrier(headers));
    });
}

/// Remote parent context from incoming request headers.
pub fn extract_trace_context(headers: &HeaderMap) -> Context {
    ensure_propagator_installed();
    opentelemetry::global::get_text_map_propagator(|p| p.extract(&ReadCarrier(headers)))
}

struct Carrier<'a>(&'a mut HeaderMap);

impl Injector for Carrier<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(val)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            self.0.insert(name, val);
        }
    }
}

struct ReadCarrier<'a>(&'a HeaderMap);

impl Extractor for ReadCarrier<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.to_str().ok()
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}
