//! SSE hub server entry point
//!
//! Run with:
//! ```bash
//! cargo run -p sse-hub
//! ```
//!
//! Configuration is loaded from environment variables.

use sse_common::{try_init_tracing_with_config, AppConfig, TracingConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Load configuration first so the log format can follow APP_ENV
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        app = %config.app.name,
        env = ?config.app.env,
        address = %config.server.address(),
        retry_ms = config.hub.retry_ms,
        "Configuration loaded"
    );

    if let Err(e) = sse_hub::run(config).await {
        error!(error = %e, "SSE hub failed");
        std::process::exit(1);
    }
}
