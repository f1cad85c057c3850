//! Hub events
//!
//! Payloads and the closed set of addressing variants accepted by the hub.

mod event;
mod payload;

pub use event::{Event, Lane};
pub use payload::{EventData, Payload};
