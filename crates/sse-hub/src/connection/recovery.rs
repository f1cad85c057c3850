//! Reconnect recovery
//!
//! A client reconnecting with a `Last-Event-ID` gets a window in which only
//! replayed events reach it. The embedding application fills that window
//! through `Event::Recovery` and ends it with [`Reconnect::stop_recovery`].

use super::{Consumer, ConsumerId};
use crate::broadcast::Command;
use serde::Serialize;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Recovery handshake state of one consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryState {
    /// Connected without a last event id; live traffic only
    NoRecovery,
    /// Replaying missed events; live traffic is held back
    Recovering,
    /// Replay finished; live traffic only
    RecoveryClosed,
}

/// Handed to the reconnect hook when a client resumes
pub struct Reconnect<C: ConsumerId> {
    cid: C,
    last_event_id: String,
    consumer: Arc<Consumer<C>>,
    commands: mpsc::WeakSender<Command<C>>,
    stopped: bool,
}

impl<C: ConsumerId> Reconnect<C> {
    pub(crate) fn new(
        consumer: Arc<Consumer<C>>,
        last_event_id: String,
        commands: mpsc::WeakSender<Command<C>>,
    ) -> Self {
        Self {
            cid: consumer.cid().clone(),
            last_event_id,
            consumer,
            commands,
            stopped: false,
        }
    }

    /// Identity of the reconnecting consumer
    pub fn cid(&self) -> &C {
        &self.cid
    }

    /// Id of the last event the client reported seeing
    pub fn last_event_id(&self) -> &str {
        &self.last_event_id
    }

    /// End the recovery window.
    ///
    /// The end marker is queued behind every event already submitted to the
    /// hub, so recovery events sent before this call are replayed first.
    /// Live traffic meanwhile is parked on the consumer, so the dispatch loop
    /// never waits on this consumer to reach the marker.
    pub async fn stop_recovery(mut self) {
        self.stopped = true;

        if let Some(commands) = self.commands.upgrade() {
            let command = Command::EndRecovery(self.consumer.clone());
            if commands.send(command).await.is_ok() {
                return;
            }
        }

        // hub is closed, nothing left to order against
        self.consumer.close_recovery();
    }
}

impl<C: ConsumerId> Drop for Reconnect<C> {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }

        // disconnected while the hook ran, nothing left to replay
        if self.consumer.is_cancelled() {
            self.consumer.close_recovery();
            return;
        }

        tracing::warn!(
            cid = ?self.cid,
            "Reconnect dropped without stop_recovery, ending recovery"
        );

        let Some(commands) = self.commands.upgrade() else {
            self.consumer.close_recovery();
            return;
        };

        match commands.try_send(Command::EndRecovery(self.consumer.clone())) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => match Handle::try_current() {
                // queue behind pending recovery events rather than cut them off
                Ok(runtime) => {
                    runtime.spawn(async move {
                        if let Err(err) = commands.send(command).await {
                            if let Command::EndRecovery(consumer) = err.0 {
                                consumer.close_recovery();
                            }
                        }
                    });
                }
                Err(_) => {
                    self.consumer.close_recovery();
                }
            },
            Err(TrySendError::Closed(_)) => {
                self.consumer.close_recovery();
            }
        }
    }
}

impl<C: ConsumerId> std::fmt::Debug for Reconnect<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconnect")
            .field("cid", &self.cid)
            .field("last_event_id", &self.last_event_id)
            .finish()
    }
}
