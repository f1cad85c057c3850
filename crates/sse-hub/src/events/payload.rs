//! Event payloads

use crate::protocol::format_event;
use serde::{Deserialize, Serialize};

/// The `data` field of an event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventData {
    pub value: String,
    /// Write `value` as a single `data:` line even if it contains newlines
    #[serde(default)]
    pub disable_formatting: bool,
}

impl EventData {
    /// Data split into one `data:` line per newline-separated segment
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            disable_formatting: false,
        }
    }

    /// Data written verbatim on one `data:` line
    #[must_use]
    pub fn raw(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            disable_formatting: true,
        }
    }
}

impl From<&str> for EventData {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EventData {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Name, data and id of one event. Empty fields are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub data: EventData,
    #[serde(default)]
    pub id: String,
}

impl Payload {
    /// Create a payload carrying only data
    #[must_use]
    pub fn new(data: impl Into<EventData>) -> Self {
        Self {
            event: String::new(),
            data: data.into(),
            id: String::new(),
        }
    }

    /// Set the event name
    #[must_use]
    pub fn event(mut self, name: impl Into<String>) -> Self {
        self.event = name.into();
        self
    }

    /// Set the event id
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Frame this payload for the wire
    #[must_use]
    pub fn to_wire(&self) -> String {
        format_event(&self.event, &self.data, &self.id)
    }
}
