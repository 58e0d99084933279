//! Server-sent event framing for the streamable HTTP transport.
//!
//! Two readers live here. [`decode_sse_events`] groups lines into events the
//! way the event-stream format defines them. [`last_json_payload`] is the
//! line scan the request/response exchange uses: every `data:` line stands
//! alone and the last one that parses as JSON wins.
//!
//! Lines end at `\r\n`, `\n` or a bare `\r`.

use anyhow::Context as _;
use serde_json::Value;

/// Event name servers use for JSON-RPC traffic.
pub const MESSAGE_EVENT: &str = "message";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field; `None` means the default `message` type.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

impl SseEvent {
    /// A `message` event carrying one serialized JSON-RPC envelope.
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            event: Some(MESSAGE_EVENT.to_string()),
            data: data.into(),
        }
    }

    /// Wire form, terminated by the blank line that dispatches the event.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + 32);
        if let Some(ev) = &self.event {
            out.push_str("event: ");
            out.push_str(ev);
            out.push('\n');
        }
        let mut lines = split_lines(&self.data).peekable();
        if lines.peek().is_none() {
            out.push_str("data: \n");
        }
        for line in lines {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// Split an event-stream body into events.
///
/// Events without any `data:` line are dropped. Comments and fields other
/// than `event` and `data` are ignored.
pub fn decode_sse_events(body: &str) -> Vec<SseEvent> {
    let mut events = Vec::new();
    let mut event: Option<String> = None;
    let mut data: Vec<&str> = Vec::new();

    let mut dispatch = |event: &mut Option<String>, data: &mut Vec<&str>| {
        if !data.is_empty() {
            events.push(SseEvent {
                event: event.take(),
                data: data.join("\n"),
            });
        }
        *event = None;
        data.clear();
    };

    for line in split_lines(body) {
        if line.is_empty() {
            dispatch(&mut event, &mut data);
            continue;
        }
        if line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "data" => data.push(value),
            "event" => event = Some(value.to_string()),
            _ => {}
        }
    }
    dispatch(&mut event, &mut data);

    events
}

/// First event's data parsed as JSON.
pub fn first_json_payload(body: &str) -> anyhow::Result<Value> {
    let events = decode_sse_events(body);
    let first = events.first().context("no sse events")?;
    serde_json::from_str(&first.data).context("parse sse data as json")
}

/// Last `data:` line in `body` that parses as JSON.
///
/// Lines are trimmed; blank and `:` comment lines are skipped, as are data
/// lines that fail to parse. Earlier payloads of a multi-event stream are
/// dropped. A `null` payload counts as none, so a trailing `data: null`
/// clears whatever came before it.
pub fn last_json_payload(body: &str) -> Option<Value> {
    split_lines(body)
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with(':'))
        .filter_map(|l| l.strip_prefix("data:"))
        .fold(None, |kept, d| match serde_json::from_str::<Value>(d.trim()) {
            Ok(Value::Null) => None,
            Ok(v) => Some(v),
            Err(_) => kept,
        })
}

/// Lines of an event stream without their terminators. A trailing
/// terminator does not start another (empty) line.
fn split_lines(body: &str) -> impl Iterator<Item = &str> {
    let mut rest = body;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let Some(end) = rest.find(['\r', '\n']) else {
            return Some(std::mem::take(&mut rest));
        };
        let line = &rest[..end];
        let skip = if rest[end..].starts_with("\r\n") { 2 } else { 1 };
        rest = &rest[end + skip..];
        Some(line)
    })
}
