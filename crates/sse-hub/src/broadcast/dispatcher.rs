//! Event dispatcher
//!
//! Drains the hub inbound queue and fans each event out to its targets.

use crate::connection::{Consumer, ConsumerId, ConsumerRegistry};
use crate::events::Event;
use crate::hub::RetryInterval;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Work item on the hub inbound queue
pub(crate) enum Command<C: ConsumerId> {
    /// Fan an event out to its targets
    Dispatch(Event<C>),
    /// Close a consumer's recovery queue once everything submitted before it
    /// has been dispatched
    EndRecovery(Arc<Consumer<C>>),
}

/// Single dispatch loop for one hub.
///
/// Events are handled strictly in submission order. A consumer whose queue
/// is full stalls the loop until it makes room or is cancelled. Consumers
/// still in recovery park live traffic and never stall it.
pub(crate) struct Dispatcher<C: ConsumerId> {
    registry: Arc<ConsumerRegistry<C>>,
    retry: Arc<RetryInterval>,
}

impl<C: ConsumerId> Dispatcher<C> {
    pub(crate) fn new(registry: Arc<ConsumerRegistry<C>>, retry: Arc<RetryInterval>) -> Self {
        Self { registry, retry }
    }

    /// Run until every sender of the inbound queue is gone
    pub(crate) async fn run(self, mut commands: mpsc::Receiver<Command<C>>) {
        tracing::debug!("Event dispatcher started");

        while let Some(command) = commands.recv().await {
            match command {
                Command::Dispatch(event) => self.dispatch(event).await,
                Command::EndRecovery(consumer) => {
                    consumer.close_recovery();
                }
            }
        }

        tracing::info!("Event dispatcher loop ended");
    }

    async fn dispatch(&self, event: Event<C>) {
        if let Event::Retry(retry) = &event {
            self.retry.set(*retry);
        }

        let message = event.to_wire();
        let lane = event.lane();
        let targets = event.route(&self.registry);

        tracing::trace!(
            kind = event.kind(),
            targets = targets.len(),
            "Dispatching event"
        );

        let mut delivered = 0usize;
        for consumer in &targets {
            if consumer.enqueue(lane, message.clone()).await {
                delivered += 1;
            } else {
                tracing::debug!(
                    cid = ?consumer.cid(),
                    kind = event.kind(),
                    "Consumer not accepting, event skipped"
                );
            }
        }

        if delivered < targets.len() {
            tracing::trace!(
                kind = event.kind(),
                delivered,
                skipped = targets.len() - delivered,
                "Event partially delivered"
            );
        }
    }
}
