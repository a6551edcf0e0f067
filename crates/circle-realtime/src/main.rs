//! Circle realtime client entry point
//!
//! Run with:
//! ```bash
//! REALTIME_ROOMS=circle:1,circle:2 cargo run -p circle-realtime
//! ```
//!
//! Configuration is loaded from environment variables.

use circle_common::{try_init_tracing_with_config, AppConfig, TracingConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Load configuration; tracing depends on the environment it names
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing
    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "Realtime client failed");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let rooms: Vec<String> = std::env::var("REALTIME_ROOMS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_owned)
        .collect();

    info!(
        env = ?config.app.env,
        url = %config.realtime.url,
        enabled = config.realtime.enabled,
        rooms = rooms.len(),
        "Configuration loaded"
    );

    circle_realtime::run(config, rooms).await
}
