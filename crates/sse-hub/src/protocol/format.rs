//! Event framing
//!
//! Pure functions turning event fields into `event:`/`data:`/`id:` blocks.

use crate::events::EventData;
use std::fmt::Write;
use std::time::Duration;

/// Field name of the reconnect directive
pub const RETRY_FIELD: &str = "retry";

/// Frame a single event.
///
/// Raw newlines are stripped from the name and id since header lines must stay
/// single-line. Data is split into one `data:` line per segment unless
/// formatting is disabled, in which case the value is written verbatim.
#[must_use]
pub fn format_event(event: &str, data: &EventData, id: &str) -> String {
    let mut out = String::with_capacity(event.len() + data.value.len() + id.len() + 24);

    if !event.is_empty() {
        let _ = writeln!(out, "event:{}", event.replace('\n', ""));
    }

    if !data.value.is_empty() {
        if data.disable_formatting {
            let _ = writeln!(out, "data:{}", data.value);
        } else {
            for line in data.value.split('\n') {
                let _ = writeln!(out, "data:{line}");
            }
        }
    }

    if !id.is_empty() {
        let _ = writeln!(out, "id:{}", id.replace('\n', ""));
    }

    out.push('\n');
    out
}

/// Frame a standalone reconnect directive
#[must_use]
pub fn format_retry(retry: Duration) -> String {
    format!("{RETRY_FIELD}:{}\n\n", retry.as_millis())
}

/// Append a reconnect directive to an already framed event.
///
/// Messages that already mention `retry` anywhere are returned unchanged.
#[must_use]
pub fn with_retry(message: &str, retry: Duration) -> String {
    if message.contains(RETRY_FIELD) {
        return message.to_string();
    }

    let body = message
        .strip_suffix("\n\n")
        .or_else(|| message.strip_suffix('\n'))
        .unwrap_or(message);

    if body.is_empty() {
        format_retry(retry)
    } else {
        format!("{body}\n{}", format_retry(retry))
    }
}
