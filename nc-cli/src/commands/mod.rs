//! CLI command implementations.

pub mod config;
pub mod listen;
pub mod ping;

use tracing::warn;

use nc_core::config::AppConfig;
use nc_core::error::NcResult;
use nc_socket::{ClientConfig, NotificationClient, SocketIoTransport};

/// Helper to build a websocket/polling client from config.
pub fn create_client(config: &AppConfig) -> NcResult<NotificationClient<SocketIoTransport>> {
    let transport = SocketIoTransport::from_config(&config.server)?;
    Ok(NotificationClient::new(
        ClientConfig::from_app_config(config),
        transport,
    ))
}

/// Resolves on Ctrl+C. Never resolves if the signal handler can't be installed.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}
