//! Hub
//!
//! Owns the consumer registry, the inbound event queue and its dispatch loop,
//! the notification hooks and the shutdown protocol.

mod config;
mod error;
mod hooks;

pub use config::{HubConfig, RetryInterval, DEFAULT_BUFFER, DEFAULT_RETRY};
pub use error::HubError;

use crate::broadcast::{Command, Dispatcher};
use crate::connection::{
    CloseNotify, Consumer, ConsumerId, ConsumerRegistry, Reconnect, Subscription, Transport,
};
use crate::events::Event;
use crate::protocol::STREAM_HEADERS;
use hooks::Hooks;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

struct Inner<C: ConsumerId> {
    config: HubConfig,
    registry: Arc<ConsumerRegistry<C>>,
    retry: Arc<RetryInterval>,

    /// Taken on close so the dispatch loop can drain and stop
    commands: Mutex<Option<mpsc::Sender<Command<C>>>>,
    /// Handed to `Reconnect`s; does not keep the dispatch loop alive
    weak_commands: mpsc::WeakSender<Command<C>>,

    hooks: RwLock<Hooks<C>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,

    /// Supervising task of every consumer
    tracker: TaskTracker,
}

/// Server-Sent Events hub.
///
/// Cheap to clone; every clone drives the same hub.
pub struct Hub<C: ConsumerId> {
    inner: Arc<Inner<C>>,
}

impl<C: ConsumerId> Clone for Hub<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: ConsumerId> Hub<C> {
    /// Create a hub and start its dispatch loop.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        let registry = Arc::new(ConsumerRegistry::new());
        let retry = Arc::new(RetryInterval::new(config.retry));
        let (commands, receiver) = mpsc::channel(config.event_buffer.max(1));

        let dispatcher = Dispatcher::new(registry.clone(), retry.clone());
        let handle = tokio::spawn(dispatcher.run(receiver));

        tracing::debug!(
            retry_ms = u64::try_from(config.retry.as_millis()).unwrap_or(u64::MAX),
            event_buffer = config.event_buffer,
            consumer_buffer = config.consumer_buffer,
            duplicate_policy = ?config.duplicate_policy,
            "Hub created"
        );

        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                retry,
                weak_commands: commands.downgrade(),
                commands: Mutex::new(Some(commands)),
                hooks: RwLock::new(Hooks::default()),
                dispatcher: Mutex::new(Some(handle)),
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Hub configuration as created
    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Reconnect delay currently announced to new consumers
    pub fn retry(&self) -> Duration {
        self.inner.retry.get()
    }

    /// Check if `close` has been called
    pub fn is_closed(&self) -> bool {
        !self.inner.registry.is_accepting()
    }

    /// Approximate number of registered consumers
    pub fn count_consumers(&self) -> usize {
        self.inner.registry.len()
    }

    fn sender(&self) -> Result<mpsc::Sender<Command<C>>, HubError> {
        self.inner.commands.lock().clone().ok_or(HubError::Closed)
    }

    /// Submit an event, waiting while the inbound queue is full
    pub async fn send(&self, event: Event<C>) -> Result<(), HubError> {
        let sender = self.sender()?;
        sender
            .send(Command::Dispatch(event))
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Submit an event without waiting
    pub fn try_send(&self, event: Event<C>) -> Result<(), HubError> {
        let sender = self.sender()?;
        sender
            .try_send(Command::Dispatch(event))
            .map_err(|err| match err {
                TrySendError::Full(_) => HubError::QueueFull,
                TrySendError::Closed(_) => HubError::Closed,
            })
    }

    /// Called with the CID after a consumer is registered
    pub fn on_connect<F, Fut>(&self, f: F)
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.hooks.write().connect = Some(hooks::hook(f));
    }

    /// Called with the CID after a consumer has been unregistered
    pub fn on_disconnect<F, Fut>(&self, f: F)
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.hooks.write().disconnect = Some(hooks::hook(f));
    }

    /// Called when a consumer connects with a last event id.
    ///
    /// The hook replays missed events with [`Event::Recovery`] and then calls
    /// [`Reconnect::stop_recovery`]. Without a reconnect hook, recovery ends
    /// as soon as the consumer is registered.
    pub fn on_reconnect<F, Fut>(&self, f: F)
    where
        F: Fn(Reconnect<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.hooks.write().reconnect = Some(hooks::hook(f));
    }

    /// Disconnect and unregister the consumer holding `cid`.
    ///
    /// Returns `false` if no consumer holds it.
    pub fn remove_consumer(&self, cid: &C) -> bool {
        let Some(consumer) = self.inner.registry.get(cid) else {
            return false;
        };

        consumer.cancel();
        self.inner.registry.remove(&consumer);

        tracing::debug!(cid = ?cid, "Consumer removed");
        true
    }

    /// Register a consumer streaming to `transport`.
    ///
    /// A non-empty `last_event_id` starts the consumer in recovery.
    pub fn connect<T: Transport>(
        &self,
        cid: C,
        mut transport: T,
        last_event_id: Option<String>,
    ) -> Result<Subscription<C>, HubError> {
        if !transport.supports_streaming() {
            return Err(HubError::StreamingUnsupported);
        }

        // keeps `close` waiting until the supervising task below is spawned
        let _tracked = self.inner.tracker.token();

        let last_event_id = last_event_id.filter(|id| !id.is_empty());
        let lifetime = CancellationToken::new();
        let (consumer, queues) = Consumer::new(
            cid.clone(),
            self.inner.config.consumer_buffer,
            last_event_id.is_some(),
            lifetime.clone(),
        );

        let policy = self.inner.config.duplicate_policy;
        if let Some(stale) = self.inner.registry.insert(consumer.clone(), policy)? {
            stale.cancel();
        }

        for (name, value) in STREAM_HEADERS {
            transport.set_header(name, value);
        }
        for (name, value) in &self.inner.config.headers {
            transport.set_header(name, value);
        }

        let close_notify = transport.close_notify();
        let delivery = tokio::spawn(consumer.clone().deliver(
            queues,
            transport,
            self.inner.retry.clone(),
        ));

        let task = self.inner.tracker.spawn(supervise(
            self.inner.clone(),
            consumer,
            last_event_id,
            close_notify,
            delivery,
        ));

        Ok(Subscription::new(cid, lifetime, task))
    }

    /// Shut the hub down.
    ///
    /// New connections are refused, every consumer is cancelled and the
    /// inbound queue is drained and closed. Returns once every consumer's
    /// disconnect hook has run. Calling it again is a no-op.
    pub async fn close(&self) {
        let Some(consumers) = self.inner.registry.seal() else {
            tracing::debug!("Hub already closed");
            return;
        };

        tracing::info!(consumers = consumers.len(), "Closing hub");

        for consumer in &consumers {
            consumer.cancel();
        }
        drop(self.inner.commands.lock().take());

        self.inner.tracker.close();
        self.inner.tracker.wait().await;

        let dispatcher = self.inner.dispatcher.lock().take();
        if let Some(handle) = dispatcher {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "Dispatch loop failed");
            }
        }

        tracing::info!("Hub closed");
    }
}

impl<C: ConsumerId> std::fmt::Debug for Hub<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("consumers", &self.count_consumers())
            .field("retry", &self.retry())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Lifecycle of one consumer, from the connect hook to the disconnect hook
async fn supervise<C: ConsumerId>(
    inner: Arc<Inner<C>>,
    consumer: Arc<Consumer<C>>,
    last_event_id: Option<String>,
    close_notify: CloseNotify,
    mut delivery: JoinHandle<()>,
) {
    let cid = consumer.cid().clone();
    let lifetime = consumer.lifetime().clone();
    let registered = inner.hooks.read().clone();

    tracing::info!(
        cid = ?cid,
        recovering = last_event_id.is_some(),
        "Consumer connected"
    );

    if let Some(hook) = &registered.connect {
        tokio::select! {
            () = hooks::run("connect", &cid, hook(cid.clone())) => {}
            () = lifetime.cancelled() => {}
        }
    }

    if let Some(last_event_id) = last_event_id {
        match &registered.reconnect {
            Some(hook) => {
                let reconnect =
                    Reconnect::new(consumer.clone(), last_event_id, inner.weak_commands.clone());
                tokio::select! {
                    () = hooks::run("reconnect", &cid, hook(reconnect)) => {}
                    () = lifetime.cancelled() => {}
                }
            }
            None => {
                consumer.close_recovery();
            }
        }
    }

    let delivery_done = tokio::select! {
        () = lifetime.cancelled() => false,
        () = close_notify => {
            tracing::debug!(cid = ?cid, "Peer closed the stream");
            false
        }
        result = &mut delivery => {
            if let Err(err) = result {
                tracing::error!(cid = ?cid, error = %err, "Delivery task failed");
            }
            true
        }
    };

    consumer.cancel();
    if !delivery_done {
        if let Err(err) = delivery.await {
            tracing::error!(cid = ?cid, error = %err, "Delivery task failed");
        }
    }

    inner.registry.remove(&consumer);

    if let Some(hook) = &registered.disconnect {
        hooks::run("disconnect", &cid, hook(cid.clone())).await;
    }

    tracing::info!(cid = ?cid, "Consumer disconnected");
}
