//! # sse-hub
//!
//! Server-Sent Events hub: broadcast, targeted and excluded fan-out to
//! streaming consumers, with reconnect recovery driven by `Last-Event-ID`.

mod broadcast;
pub mod connection;
pub mod events;
pub mod hub;
pub mod protocol;
pub mod server;

pub use connection::{
    ChannelStream, ChannelTransport, ConsumerId, Reconnect, RecoveryState, Subscription,
    Transport, TransportError,
};
pub use events::{Event, EventData, Payload};
pub use hub::{Hub, HubConfig, HubError};
pub use server::run;
