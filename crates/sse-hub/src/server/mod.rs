//! HTTP adapter
//!
//! Serves a string-keyed hub over HTTP: a streaming endpoint plus endpoints
//! to publish events and administer consumers.

mod error;
mod handler;
mod state;

pub use error::{ApiError, ApiResult, ErrorBody};
pub use handler::{
    events_handler, health_check, publish_handler, remove_consumer_handler, retry_handler,
    stats_handler, ConnectQuery, PublishRequest, RetryRequest, StatsResponse,
    CONSUMER_ID_HEADER,
};
pub use state::AppState;

use crate::hub::{Hub, HubConfig};
use axum::{
    routing::{delete, get, put},
    Router,
};
use sse_common::{AppConfig, AppError};
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Create the router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/events", get(events_handler).post(publish_handler))
        .route("/retry", put(retry_handler))
        .route("/consumers/:cid", delete(remove_consumer_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_check))
}

/// Build the complete application
pub fn create_app(state: AppState) -> Router {
    create_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create the hub and the state serving it
///
/// # Panics
/// Panics if called outside a Tokio runtime.
#[must_use]
pub fn create_app_state(config: AppConfig) -> AppState {
    let hub = Hub::new(HubConfig::from(&config.hub));
    AppState::new(hub, config)
}

/// Serve `state` on `listener` until `shutdown` resolves, then close the hub.
///
/// The hub is closed before in-flight streams are awaited, since open
/// streams only end once their consumers are cancelled.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), AppError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let hub = state.hub().clone();
    let app = create_app(state);

    let closing = async move {
        shutdown.await;
        tracing::info!("Shutting down, closing hub");
        hub.close().await;
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(closing)
        .await
        .map_err(|e| AppError::Config(format!("Server error: {e}")))
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl-C");
}

/// Run the complete server with configuration
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let addr = config.server.address();

    tracing::info!("Starting SSE hub on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Config(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!("Streaming on http://{}/events", addr);

    let state = create_app_state(config);
    serve(listener, state, shutdown_signal()).await?;

    tracing::info!("Server stopped");
    Ok(())
}
