//! Connection management
//!
//! Consumers, the registry that addresses them, the recovery handshake and
//! the transports they write to.

mod consumer;
mod recovery;
mod registry;
mod subscription;
mod transport;

pub use consumer::Consumer;
#[cfg(test)]
pub(crate) use consumer::Queues;
pub use recovery::{Reconnect, RecoveryState};
pub use registry::ConsumerRegistry;
pub use subscription::Subscription;
pub use transport::{ChannelStream, ChannelTransport, CloseNotify, Transport, TransportError};

use std::fmt::Debug;
use std::hash::Hash;

/// Identity of a consumer, supplied by the embedding application
pub trait ConsumerId: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> ConsumerId for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}
