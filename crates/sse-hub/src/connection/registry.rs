//! Consumer registry
//!
//! Maps CIDs to live consumers behind a single `RwLock`. Lookups take the
//! read lock and return owned `Arc`s, so no lock is ever held while a caller
//! waits on a consumer queue.

use super::{Consumer, ConsumerId};
use crate::hub::HubError;
use parking_lot::RwLock;
use sse_common::DuplicatePolicy;
use std::collections::HashMap;
use std::sync::Arc;

struct State<C> {
    consumers: HashMap<C, Arc<Consumer<C>>>,
    accepting: bool,
}

/// All consumers currently registered with a hub
pub struct ConsumerRegistry<C> {
    state: RwLock<State<C>>,
}

impl<C: ConsumerId> ConsumerRegistry<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                consumers: HashMap::new(),
                accepting: true,
            }),
        }
    }

    /// Register a consumer under its CID.
    ///
    /// With [`DuplicatePolicy::Evict`] the consumer previously holding the
    /// CID is returned so the caller can cancel it.
    pub fn insert(
        &self,
        consumer: Arc<Consumer<C>>,
        policy: DuplicatePolicy,
    ) -> Result<Option<Arc<Consumer<C>>>, HubError> {
        let mut state = self.state.write();
        if !state.accepting {
            return Err(HubError::ShuttingDown);
        }

        let cid = consumer.cid().clone();
        if policy == DuplicatePolicy::Reject && state.consumers.contains_key(&cid) {
            return Err(HubError::DuplicateConsumer(format!("{cid:?}")));
        }

        let evicted = state.consumers.insert(cid.clone(), consumer);
        if evicted.is_some() {
            tracing::info!(cid = ?cid, "Evicted consumer holding the same CID");
        }

        Ok(evicted)
    }

    /// Unregister `consumer`, unless its CID has since been taken over.
    ///
    /// Returns `true` if it was removed.
    pub fn remove(&self, consumer: &Arc<Consumer<C>>) -> bool {
        let mut state = self.state.write();
        match state.consumers.get(consumer.cid()) {
            Some(current) if Arc::ptr_eq(current, consumer) => {
                state.consumers.remove(consumer.cid());
                true
            }
            _ => false,
        }
    }

    /// Get the consumer registered under `cid`
    pub fn get(&self, cid: &C) -> Option<Arc<Consumer<C>>> {
        self.state.read().consumers.get(cid).cloned()
    }

    /// Snapshot of the consumers whose CID matches `predicate`
    pub fn select<F>(&self, predicate: F) -> Vec<Arc<Consumer<C>>>
    where
        F: Fn(&C) -> bool,
    {
        self.state
            .read()
            .consumers
            .iter()
            .filter(|(cid, _)| predicate(cid))
            .map(|(_, consumer)| consumer.clone())
            .collect()
    }

    /// Number of registered consumers
    pub fn len(&self) -> usize {
        self.state.read().consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().consumers.is_empty()
    }

    /// Whether new consumers are still accepted
    pub fn is_accepting(&self) -> bool {
        self.state.read().accepting
    }

    /// Stop accepting consumers and return everyone registered.
    ///
    /// Returns `None` if the registry was already sealed.
    pub fn seal(&self) -> Option<Vec<Arc<Consumer<C>>>> {
        let mut state = self.state.write();
        if !state.accepting {
            return None;
        }
        state.accepting = false;
        Some(state.consumers.values().cloned().collect())
    }
}

impl<C: ConsumerId> Default for ConsumerRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
