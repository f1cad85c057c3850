//! Streaming transports
//!
//! The hub writes framed events to anything implementing [`Transport`].
//! [`ChannelTransport`] is the in-process implementation backing the HTTP
//! adapter and the tests.

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Future resolving once the peer has torn the connection down
pub type CloseNotify = BoxFuture<'static, ()>;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Stream closed by peer")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A writable, flushable outbound stream
#[async_trait]
pub trait Transport: Send + 'static {
    /// Whether writes can be flushed to the peer one message at a time
    fn supports_streaming(&self) -> bool {
        true
    }

    /// Set response metadata. Only called before the first write.
    fn set_header(&mut self, name: &str, value: &str);

    /// Buffer bytes for the peer
    async fn write(&mut self, chunk: &[u8]) -> Result<(), TransportError>;

    /// Push buffered bytes to the peer
    async fn flush(&mut self) -> Result<(), TransportError>;

    /// Resolves when the peer goes away
    fn close_notify(&self) -> CloseNotify;
}

type SharedHeaders = Arc<Mutex<Vec<(String, String)>>>;

/// Transport writing into a bounded in-process channel
pub struct ChannelTransport {
    sender: mpsc::Sender<Bytes>,
    headers: SharedHeaders,
    pending: Vec<u8>,
    peer_gone: CancellationToken,
    streaming: bool,
}

/// Receiving half of a [`ChannelTransport`]. Dropping it closes the stream.
pub struct ChannelStream {
    receiver: mpsc::Receiver<Bytes>,
    headers: SharedHeaders,
    _peer: DropGuard,
}

impl ChannelTransport {
    /// Create a transport whose stream buffers up to `capacity` flushed chunks
    #[must_use]
    pub fn new(capacity: usize) -> (Self, ChannelStream) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let headers = SharedHeaders::default();
        let peer_gone = CancellationToken::new();

        let transport = Self {
            sender,
            headers: headers.clone(),
            pending: Vec::new(),
            peer_gone: peer_gone.clone(),
            streaming: true,
        };
        let stream = ChannelStream {
            receiver,
            headers,
            _peer: peer_gone.drop_guard(),
        };

        (transport, stream)
    }

    /// Mark the transport as unable to stream, so the hub refuses it
    #[must_use]
    pub fn without_streaming(mut self) -> Self {
        self.streaming = false;
        self
    }

    fn is_closed(&self) -> bool {
        self.peer_gone.is_cancelled() || self.sender.is_closed()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    fn set_header(&mut self, name: &str, value: &str) {
        let mut headers = self.headers.lock();
        match headers
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(index) => headers[index].1 = value.to_string(),
            None => headers.push((name.to_string(), value.to_string())),
        }
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.pending.extend_from_slice(chunk);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::take(&mut self.pending));
        self.sender
            .send(chunk)
            .await
            .map_err(|_| TransportError::Closed)
    }

    fn close_notify(&self) -> CloseNotify {
        self.peer_gone.clone().cancelled_owned().boxed()
    }
}

impl ChannelStream {
    /// Next flushed chunk, or `None` once the writer is gone
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.receiver.recv().await
    }

    /// Headers set on the transport so far
    pub fn headers(&self) -> Vec<(String, String)> {
        self.headers.lock().clone()
    }

    /// Look up one header, ignoring case
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .lock()
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }

    /// Turn the stream into an HTTP response body
    pub fn into_body(self) -> Body {
        let chunks = futures::stream::unfold(self, |mut stream| async move {
            stream
                .receiver
                .recv()
                .await
                .map(|chunk| (Ok::<_, Infallible>(chunk), stream))
        });
        Body::from_stream(chunks)
    }
}
