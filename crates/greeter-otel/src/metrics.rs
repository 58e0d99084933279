use std::sync::OnceLock;

use opentelemetry::KeyValue;
use opentelemetry::metrics::Counter;

/// Counters for served MCP traffic. Backed by the global meter provider, so
/// recording is a no-op until OTLP export is enabled.
#[derive(Debug, Clone)]
pub struct Metrics {
    tool_calls: Counter<u64>,
    sessions_opened: Counter<u64>,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let meter = opentelemetry::global::meter("greeter");
        Metrics {
            tool_calls: meter
                .u64_counter("greeter_tool_calls_total")
                .with_description("tools/call requests handled, by tool and outcome.")
                .build(),
            sessions_opened: meter
                .u64_counter("greeter_sessions_opened_total")
                .with_description("Streamable HTTP sessions created by initialize.")
                .build(),
        }
    })
}

impl Metrics {
    pub fn record_tool_call(&self, tool: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        self.tool_calls.add(
            1,
            &[
                KeyValue::new("tool", tool.to_string()),
                KeyValue::new("outcome", outcome),
            ],
        );
    }

    pub fn record_session_opened(&self) {
        self.sessions_opened.add(1, &[]);
    }
}
