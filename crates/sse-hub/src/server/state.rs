//! Server state
//!
//! Application state for the HTTP adapter.

use crate::hub::Hub;
use sse_common::AppConfig;
use std::sync::Arc;

/// HTTP adapter state
///
/// Consumers are identified by string CIDs taken from the request.
#[derive(Clone)]
pub struct AppState {
    /// Hub serving every stream
    hub: Hub<String>,
    /// Application configuration
    config: Arc<AppConfig>,
}

impl AppState {
    /// Create a new server state
    pub fn new(hub: Hub<String>, config: AppConfig) -> Self {
        Self {
            hub,
            config: Arc::new(config),
        }
    }

    /// Get the hub
    pub fn hub(&self) -> &Hub<String> {
        &self.hub
    }

    /// Get the application configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("hub", &self.hub)
            .field("config", &"AppConfig")
            .finish()
    }
}
