//! Test helpers for integration tests
//!
//! Provides a test server on an ephemeral port, HTTP request shortcuts and
//! readers that split event streams into messages.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use sse_common::AppConfig;
use sse_hub::server::{create_app_state, serve};
use sse_hub::{ChannelStream, Hub};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// How long a reader waits for the next message
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Test server instance that manages lifecycle
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    pub hub: Hub<String>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a new test server with default settings
    pub async fn start() -> Result<Self> {
        Self::start_with(&[]).await
    }

    /// Start a test server with settings overridden by `vars`
    pub async fn start_with(vars: &[(&str, &str)]) -> Result<Self> {
        let config = test_config(vars)?;
        let state = create_app_state(config);
        let hub = state.hub().clone();

        // Bind to an ephemeral port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown, signal) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let signal = async move {
                let _ = signal.await;
            };
            serve(listener, state, signal).await.ok();
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            addr,
            client,
            hub,
            shutdown: Some(shutdown),
            handle,
        })
    }

    /// Get base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).send().await?)
    }

    /// Make a POST request with JSON body
    pub async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.post(&url).json(body).send().await?)
    }

    /// Make a PUT request with JSON body
    pub async fn put<T: Serialize>(&self, path: &str, body: &T) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.put(&url).json(body).send().await?)
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.delete(&url).send().await?)
    }

    /// Open an event stream, optionally as a reconnect
    pub async fn subscribe(&self, cid: &str, last_event_id: Option<&str>) -> Result<Response> {
        let url = format!("{}/events?cid={}", self.base_url(), cid);
        let mut request = self.client.get(&url);
        if let Some(id) = last_event_id {
            request = request.header("Last-Event-ID", id);
        }
        Ok(request.send().await?)
    }

    /// Wait until the hub holds `expected` consumers
    pub async fn wait_for_consumers(&self, expected: usize) -> Result<()> {
        wait_until(|| self.hub.count_consumers() == expected)
            .await
            .with_context(|| {
                format!(
                    "expected {expected} consumers, have {}",
                    self.hub.count_consumers()
                )
            })
    }

    /// Trigger graceful shutdown and wait for the server to stop
    pub async fn stop(mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        tokio::time::timeout(Duration::from_secs(10), &mut self.handle)
            .await
            .context("server did not stop")??;
        Ok(())
    }
}

/// Create a test configuration from defaults plus `vars`.
///
/// The process environment is ignored so tests do not depend on it.
pub fn test_config(vars: &[(&str, &str)]) -> Result<AppConfig> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();

    AppConfig::from_lookup(|key| vars.get(key).cloned())
        .map_err(|e| anyhow::anyhow!("Config error: {}", e))
}

/// Poll `condition` until it holds or [`READ_TIMEOUT`] passes
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> Result<()> {
    let deadline = tokio::time::Instant::now() + READ_TIMEOUT;
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("condition not met within {:?}", READ_TIMEOUT);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

/// Splits an HTTP event stream into messages
pub struct EventReader {
    response: Response,
    buffer: String,
}

impl EventReader {
    pub fn new(response: Response) -> Self {
        Self {
            response,
            buffer: String::new(),
        }
    }

    /// Response header value, if present
    pub fn header(&self, name: &str) -> Option<String> {
        self.response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Next message including its terminating blank line
    pub async fn next_message(&mut self) -> Result<String> {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let message: String = self.buffer.drain(..end + 2).collect();
                return Ok(message);
            }

            let chunk = tokio::time::timeout(READ_TIMEOUT, self.response.chunk())
                .await
                .context("timed out waiting for an event")??
                .context("stream ended")?;
            self.buffer.push_str(std::str::from_utf8(&chunk)?);
        }
    }

    /// Wait for the server to end the stream, failing if a message arrives
    pub async fn expect_end(&mut self) -> Result<()> {
        let chunk = tokio::time::timeout(READ_TIMEOUT, self.response.chunk())
            .await
            .context("timed out waiting for the stream to end")?;
        match chunk {
            Ok(None) | Err(_) => Ok(()),
            Ok(Some(chunk)) => anyhow::bail!("unexpected data: {:?}", chunk),
        }
    }
}

/// Next message from an in-memory stream
pub async fn next_message(stream: &mut ChannelStream) -> Result<String> {
    let chunk = tokio::time::timeout(READ_TIMEOUT, stream.recv())
        .await
        .context("timed out waiting for an event")?
        .context("stream ended")?;
    Ok(String::from_utf8(chunk.to_vec())?)
}

/// Assert that nothing arrives on an in-memory stream for a short while
pub async fn expect_silence(stream: &mut ChannelStream) -> Result<()> {
    match tokio::time::timeout(Duration::from_millis(100), stream.recv()).await {
        Err(_) => Ok(()),
        Ok(Some(chunk)) => anyhow::bail!("unexpected data: {:?}", chunk),
        Ok(None) => anyhow::bail!("stream ended"),
    }
}

/// Wait until an in-memory stream has been closed by the hub
pub async fn expect_closed(stream: &mut ChannelStream) -> Result<()> {
    loop {
        let next = tokio::time::timeout(READ_TIMEOUT, stream.recv())
            .await
            .context("timed out waiting for the stream to close")?;
        if next.is_none() {
            return Ok(());
        }
    }
}

/// Assert response status and parse JSON body
pub async fn assert_json<T: DeserializeOwned>(
    response: Response,
    expected_status: StatusCode,
) -> Result<T> {
    let status = response.status();
    if status != expected_status {
        let body = response.text().await?;
        anyhow::bail!(
            "Expected status {}, got {}. Body: {}",
            expected_status,
            status,
            body
        );
    }
    Ok(response.json().await?)
}

/// Assert response status without parsing body
pub async fn assert_status(response: Response, expected_status: StatusCode) -> Result<()> {
    let status = response.status();
    if status != expected_status {
        let body = response.text().await?;
        anyhow::bail!(
            "Expected status {}, got {}. Body: {}",
            expected_status,
            status,
            body
        );
    }
    Ok(())
}
