//! Hub configuration

use sse_common::{DuplicatePolicy, HubSettings};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default capacity of the inbound queue and of each consumer queue
pub const DEFAULT_BUFFER: usize = 50;

/// Default reconnect delay announced to clients
pub const DEFAULT_RETRY: Duration = Duration::from_secs(3);

/// Runtime configuration of a [`Hub`](super::Hub)
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Reconnect delay sent with each consumer's first message
    pub retry: Duration,
    /// Extra headers set on every stream
    pub headers: Vec<(String, String)>,
    /// Capacity of the inbound event queue
    pub event_buffer: usize,
    /// Capacity of each consumer's main and recovery queues
    pub consumer_buffer: usize,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            retry: DEFAULT_RETRY,
            headers: Vec::new(),
            event_buffer: DEFAULT_BUFFER,
            consumer_buffer: DEFAULT_BUFFER,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl HubConfig {
    #[must_use]
    pub fn with_retry(mut self, retry: Duration) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Set the inbound queue capacity. Zero is raised to one.
    #[must_use]
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    /// Set the per-consumer queue capacity. Zero is raised to one.
    #[must_use]
    pub fn with_consumer_buffer(mut self, capacity: usize) -> Self {
        self.consumer_buffer = capacity.max(1);
        self
    }
}

impl From<&HubSettings> for HubConfig {
    fn from(settings: &HubSettings) -> Self {
        let config = Self {
            retry: Duration::from_millis(settings.retry_ms),
            headers: settings.headers.clone(),
            ..Self::default()
        };

        config
            .with_event_buffer(settings.event_buffer)
            .with_consumer_buffer(settings.consumer_buffer)
            .with_duplicate_policy(settings.duplicate_policy)
    }
}

/// Reconnect delay shared by the dispatch loop and every delivery loop
#[derive(Debug)]
pub struct RetryInterval(AtomicU64);

impl RetryInterval {
    #[must_use]
    pub fn new(retry: Duration) -> Self {
        Self(AtomicU64::new(millis(retry)))
    }

    pub fn get(&self) -> Duration {
        Duration::from_millis(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, retry: Duration) {
        self.0.store(millis(retry), Ordering::Release);
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
