//! Tracing setup shared by the greeter binaries.
//!
//! JSON logs always go to stderr so the stdio transport and the client's
//! console output stay clean. OTLP export of spans and metrics is opt-in via
//! `OTEL_EXPORTER_OTLP_ENDPOINT` or `GREETER_OTEL=1`.

mod init;
mod metrics;
mod propagation;

pub use init::{OtlpSettings, TracingInitOptions, init_tracing};
pub use metrics::{Metrics, metrics};
pub use propagation::{extract_trace_context, inject_trace_headers};
