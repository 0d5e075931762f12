//! Multi-room WebSocket Chat Hub - Entry Point
//!
//! Loads configuration, starts the Hub actor and accepts connections.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_hub::{serve, AppError, Config, Hub};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_hub=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_hub=info")),
        )
        .init();

    let mut config = Config::from_env()?;

    // Bind address from command line wins over CHAT_HUB_ADDR
    if let Some(addr) = env::args().nth(1) {
        config.bind_addr = addr;
    }
    let config = Arc::new(config);

    // Start TCP listener
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Chat hub listening on {}", config.bind_addr);

    // Create Hub actor and start
    let (hub, handle) = Hub::from_config(&config);
    tokio::spawn(hub.run());

    info!("Hub actor started");

    serve(listener, handle, config).await;
    Ok(())
}
