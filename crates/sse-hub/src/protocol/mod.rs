//! Wire protocol
//!
//! Text framing for the `text/event-stream` format.

mod format;

pub use format::{format_event, format_retry, with_retry, RETRY_FIELD};

/// `Content-Type` of every event stream
pub const CONTENT_TYPE: &str = "text/event-stream";

/// Request header carrying the id of the last event a reconnecting client saw
pub const LAST_EVENT_ID: &str = "Last-Event-ID";

/// Headers set on every stream before the first byte is written
pub const STREAM_HEADERS: [(&str, &str); 3] = [
    ("Content-Type", CONTENT_TYPE),
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
];
