//! Individual consumer
//!
//! One streaming connection's delivery pipeline: a main queue, a recovery
//! queue drained first, and the loop writing both to the transport.
//!
//! While recovery is open, live traffic is parked on the consumer instead of
//! its main queue, so the dispatch loop never waits on a consumer that is not
//! reading live traffic yet.

use super::{ConsumerId, RecoveryState, Transport, TransportError};
use crate::events::Lane;
use crate::hub::RetryInterval;
use crate::protocol::with_retry;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Receiving ends of a consumer's queues, owned by its delivery loop
pub(crate) struct Queues {
    pub(crate) main: mpsc::Receiver<String>,
    pub(crate) recovery: mpsc::Receiver<String>,
}

struct RecoveryLane {
    state: RecoveryState,
    sender: Option<mpsc::Sender<String>>,
    /// Live traffic received while recovering, written once recovery ends
    held: VecDeque<String>,
}

/// How a queue drain ended
enum Drained {
    /// Queue closed and fully written
    Closed,
    /// Lifetime cancelled
    Cancelled,
    /// Transport rejected a write or flush
    Failed(TransportError),
}

/// A registered consumer
pub struct Consumer<C> {
    cid: C,

    /// Live traffic
    main: mpsc::Sender<String>,

    /// Replay traffic; the sender is dropped once recovery ends
    recovery: Mutex<RecoveryLane>,

    /// Whether the first message (carrying `retry:`) has gone out
    retry_sent: AtomicBool,

    /// Cancelled on disconnect, removal or hub shutdown
    lifetime: CancellationToken,
}

impl<C: ConsumerId> Consumer<C> {
    /// Create a consumer and the queues its delivery loop will drain.
    ///
    /// A consumer that is not `recovering` starts with its recovery queue
    /// already closed.
    pub(crate) fn new(
        cid: C,
        capacity: usize,
        recovering: bool,
        lifetime: CancellationToken,
    ) -> (Arc<Self>, Queues) {
        let capacity = capacity.max(1);
        let (main_tx, main_rx) = mpsc::channel(capacity);
        let (recovery_tx, recovery_rx) = mpsc::channel(capacity);

        let recovery = if recovering {
            RecoveryLane {
                state: RecoveryState::Recovering,
                sender: Some(recovery_tx),
                held: VecDeque::new(),
            }
        } else {
            RecoveryLane {
                state: RecoveryState::NoRecovery,
                sender: None,
                held: VecDeque::new(),
            }
        };

        let consumer = Arc::new(Self {
            cid,
            main: main_tx,
            recovery: Mutex::new(recovery),
            retry_sent: AtomicBool::new(false),
            lifetime,
        });
        let queues = Queues {
            main: main_rx,
            recovery: recovery_rx,
        };

        (consumer, queues)
    }

    /// Get the consumer identity
    pub fn cid(&self) -> &C {
        &self.cid
    }

    /// Where this consumer is in the recovery handshake
    pub fn recovery_state(&self) -> RecoveryState {
        self.recovery.lock().state
    }

    /// Close the recovery queue so delivery moves on to live traffic.
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn close_recovery(&self) -> bool {
        let mut lane = self.recovery.lock();
        if lane.state != RecoveryState::Recovering {
            return false;
        }
        lane.state = RecoveryState::RecoveryClosed;
        lane.sender = None;

        tracing::debug!(cid = ?self.cid, "Recovery queue closed");
        true
    }

    /// End this consumer's lifetime. Safe to call repeatedly.
    pub fn cancel(&self) {
        self.lifetime.cancel();
    }

    /// Check if the lifetime has ended
    pub fn is_cancelled(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    /// Check if the first message has been written
    pub fn retry_sent(&self) -> bool {
        self.retry_sent.load(Ordering::Acquire)
    }

    pub(crate) fn lifetime(&self) -> &CancellationToken {
        &self.lifetime
    }

    fn recovery_sender(&self) -> Option<mpsc::Sender<String>> {
        self.recovery.lock().sender.clone()
    }

    /// Number of live messages parked until recovery ends
    pub fn held(&self) -> usize {
        self.recovery.lock().held.len()
    }

    /// Push a framed message onto one of the queues, waiting for space.
    ///
    /// Live traffic for a recovering consumer is parked without waiting.
    /// Returns `false` if the queue is closed or the consumer is cancelled.
    pub(crate) async fn enqueue(&self, lane: Lane, message: String) -> bool {
        if self.lifetime.is_cancelled() {
            return false;
        }

        let sender = match lane {
            Lane::Main => {
                let mut recovery = self.recovery.lock();
                if recovery.state == RecoveryState::Recovering {
                    recovery.held.push_back(message);
                    return true;
                }
                self.main.clone()
            }
            Lane::Recovery => match self.recovery_sender() {
                Some(sender) => sender,
                None => return false,
            },
        };

        tokio::select! {
            biased;
            () = self.lifetime.cancelled() => false,
            sent = sender.send(message) => sent.is_ok(),
        }
    }

    /// Delivery loop: recovery queue until closed, then the live traffic
    /// parked meanwhile, then the main queue.
    ///
    /// A failed write ends this consumer's lifetime and nothing else.
    pub(crate) async fn deliver<T: Transport>(
        self: Arc<Self>,
        queues: Queues,
        mut transport: T,
        retry: Arc<RetryInterval>,
    ) {
        let Queues { main, recovery } = queues;

        let outcome = match self.drain(recovery, &mut transport, &retry).await {
            Drained::Closed => match self.release_held(&mut transport, &retry).await {
                Drained::Closed => self.drain(main, &mut transport, &retry).await,
                stopped => stopped,
            },
            stopped => stopped,
        };

        match outcome {
            Drained::Failed(err) => {
                tracing::warn!(cid = ?self.cid, error = %err, "Delivery failed, dropping consumer");
                self.cancel();
            }
            Drained::Cancelled => {
                tracing::trace!(cid = ?self.cid, "Delivery cancelled");
            }
            Drained::Closed => {
                tracing::debug!(cid = ?self.cid, "Main queue closed");
            }
        }
    }

    async fn drain<T: Transport>(
        &self,
        mut queue: mpsc::Receiver<String>,
        transport: &mut T,
        retry: &RetryInterval,
    ) -> Drained {
        loop {
            let message = tokio::select! {
                biased;
                () = self.lifetime.cancelled() => return Drained::Cancelled,
                message = queue.recv() => match message {
                    Some(message) => message,
                    None => return Drained::Closed,
                },
            };

            let written = tokio::select! {
                biased;
                () = self.lifetime.cancelled() => return Drained::Cancelled,
                written = self.write(transport, message, retry) => written,
            };

            if let Err(err) = written {
                return Drained::Failed(err);
            }
        }
    }

    /// Write the live traffic parked during recovery.
    ///
    /// Only called once the recovery queue is closed, after which nothing is
    /// parked any more.
    async fn release_held<T: Transport>(
        &self,
        transport: &mut T,
        retry: &RetryInterval,
    ) -> Drained {
        let held = std::mem::take(&mut self.recovery.lock().held);
        if !held.is_empty() {
            tracing::trace!(cid = ?self.cid, held = held.len(), "Releasing held live traffic");
        }

        for message in held {
            let written = tokio::select! {
                biased;
                () = self.lifetime.cancelled() => return Drained::Cancelled,
                written = self.write(transport, message, retry) => written,
            };

            if let Err(err) = written {
                return Drained::Failed(err);
            }
        }

        Drained::Closed
    }

    async fn write<T: Transport>(
        &self,
        transport: &mut T,
        message: String,
        retry: &RetryInterval,
    ) -> Result<(), TransportError> {
        let message = if self.retry_sent.swap(true, Ordering::AcqRel) {
            message
        } else {
            with_retry(&message, retry.get())
        };

        transport.write(message.as_bytes()).await?;
        transport.flush().await
    }
}

impl<C: ConsumerId> std::fmt::Debug for Consumer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("cid", &self.cid)
            .field("recovery", &self.recovery_state())
            .field("retry_sent", &self.retry_sent())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
