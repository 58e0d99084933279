#![no_main]

use greeter_mcp::{JsonRpcMessage, SseEvent};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let s = String::from_utf8_lossy(data);

    let _ = greeter_mcp::decode_sse_events(&s);
    let _ = greeter_mcp::first_json_payload(&s);
    let _ = greeter_mcp::last_json_payload(&s);
    let _ = serde_json::from_str::<JsonRpcMessage>(&s);

    // Whatever the payload, framing it yields exactly one event.
    let framed = SseEvent::message(&*s).encode();
    assert_eq!(greeter_mcp::decode_sse_events(&framed).len(), 1);
});
