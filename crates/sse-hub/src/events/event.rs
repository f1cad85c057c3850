//! Addressing variants
//!
//! Each variant decides who receives its framed message and on which of the
//! target consumer's two queues it lands.

use super::Payload;
use crate::connection::{Consumer, ConsumerId, ConsumerRegistry};
use crate::protocol::format_retry;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Which consumer queue a message is pushed onto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// Live traffic
    Main,
    /// Replay traffic, drained before anything on `Main`
    Recovery,
}

/// An event submitted to the hub
///
/// CIDs that are not registered when the event is dispatched are skipped.
#[derive(Debug, Clone)]
pub enum Event<C> {
    /// Every registered consumer
    Broadcast(Payload),
    /// Only the listed consumers
    Targeted { cids: Vec<C>, payload: Payload },
    /// Every consumer except the listed ones
    Excluded { cids: Vec<C>, payload: Payload },
    /// One consumer's recovery queue, used while it replays missed events
    Recovery { cid: C, payload: Payload },
    /// Change the reconnect delay and announce it to every consumer
    Retry(Duration),
}

impl<C: ConsumerId> Event<C> {
    /// Short name used in logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Broadcast(_) => "broadcast",
            Self::Targeted { .. } => "targeted",
            Self::Excluded { .. } => "excluded",
            Self::Recovery { .. } => "recovery",
            Self::Retry(_) => "retry",
        }
    }

    /// The framed message every target receives
    #[must_use]
    pub fn to_wire(&self) -> String {
        match self {
            Self::Broadcast(payload)
            | Self::Targeted { payload, .. }
            | Self::Excluded { payload, .. }
            | Self::Recovery { payload, .. } => payload.to_wire(),
            Self::Retry(retry) => format_retry(*retry),
        }
    }

    /// Queue the message lands on
    #[must_use]
    pub fn lane(&self) -> Lane {
        match self {
            Self::Recovery { .. } => Lane::Recovery,
            _ => Lane::Main,
        }
    }

    /// Resolve targets against the registry.
    ///
    /// The registry lock is released before this returns, so callers may block
    /// on the returned consumers' queues.
    pub(crate) fn route(&self, registry: &ConsumerRegistry<C>) -> Vec<Arc<Consumer<C>>> {
        match self {
            Self::Broadcast(_) | Self::Retry(_) => registry.select(|_| true),
            Self::Targeted { cids, .. } => {
                let wanted: HashSet<&C> = cids.iter().collect();
                registry.select(|cid| wanted.contains(cid))
            }
            Self::Excluded { cids, .. } => {
                let skipped: HashSet<&C> = cids.iter().collect();
                registry.select(|cid| !skipped.contains(cid))
            }
            Self::Recovery { cid, .. } => registry.get(cid).into_iter().collect(),
        }
    }
}
