//! Namespaces, well-known ids and request payloads

use serde_json::{Value, json};

/// Virtual connection management
pub const CONNECTION: &str = "urn:x-cast:com.google.cast.tp.connection";
/// Keep-alive pings
pub const HEARTBEAT: &str = "urn:x-cast:com.google.cast.tp.heartbeat";
/// Platform receiver (device status, applications)
pub const RECEIVER: &str = "urn:x-cast:com.google.cast.receiver";
/// Media playback status
pub const MEDIA: &str = "urn:x-cast:com.google.cast.media";

/// Destination id of the platform receiver
pub const PLATFORM_RECEIVER_ID: &str = "receiver-0";

/// User agent announced on `CONNECT`
pub const USER_AGENT: &str = concat!("chromecast-monitor/", env!("CARGO_PKG_VERSION"));

/// `CONNECT` on the connection namespace
#[must_use]
pub fn connect() -> Value {
    json!({
        "type": "CONNECT",
        "origin": {},
        "userAgent": USER_AGENT,
    })
}

/// `CLOSE` on the connection namespace
#[must_use]
pub fn close() -> Value {
    json!({"type": "CLOSE"})
}

/// Heartbeat `PING`
#[must_use]
pub fn ping() -> Value {
    json!({"type": "PING"})
}

/// Heartbeat `PONG`
#[must_use]
pub fn pong() -> Value {
    json!({"type": "PONG"})
}

/// `GET_STATUS`, valid on both the receiver and the media namespace
#[must_use]
pub fn get_status(request_id: u64) -> Value {
    json!({"type": "GET_STATUS", "requestId": request_id})
}
