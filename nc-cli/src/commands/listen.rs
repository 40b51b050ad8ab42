//! Listen command - connect, join a room, and print notifications until Ctrl+C.

use console::style;
use tracing::{error, info, warn};

use nc_core::config::AppConfig;
use nc_core::error::{NcError, NcResult};
use nc_socket::{NotificationClient, Shutdown, Transport};

use crate::sink;

/// Command-line overrides for `listen`.
#[derive(Debug, Default)]
pub struct ListenArgs {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub email: Option<String>,
    pub room: Option<String>,
    pub ping_secs: Option<u64>,
}

impl ListenArgs {
    /// Layer the flags over the file/env configuration.
    pub fn apply(self, config: &mut AppConfig) {
        if let Some(url) = self.url {
            config.server.url = AppConfig::sanitize_server_url(&url);
        }
        if let Some(key) = self.api_key {
            config.auth.api_key = key;
        }
        if let Some(email) = self.email {
            config.auth.email = email.trim().to_string();
        }
        if let Some(room) = self.room {
            config.subscription.room = Some(room).filter(|r| !r.trim().is_empty());
        }
        if let Some(secs) = self.ping_secs {
            config.health.ping_interval_secs = secs;
        }
    }
}

/// Join `room`, closing the session if the subscribe cannot be sent.
async fn join_room<T: Transport>(client: &mut NotificationClient<T>, room: &str) -> NcResult<()> {
    if let Err(e) = client.subscribe(room) {
        error!("failed to subscribe to {room}: {e}");
        client.disconnect().await;
        return Err(e);
    }
    Ok(())
}

/// Run the listen command.
pub async fn run(mut config: AppConfig, args: ListenArgs) -> NcResult<()> {
    args.apply(&mut config);
    config.validate()?;

    sink::print_banner(&config);
    if !config.auth.has_api_key() {
        warn!("no API key configured");
        sink::print_missing_key_warning();
    }

    let mut client = super::create_client(&config)?;

    client.on_connected(|connection| sink::line(sink::connected_message(connection)));
    client.on_disconnected(|reason| sink::line(sink::disconnected_message(reason)));
    client.on_error(|e| sink::line(format!("Connection failed: {e}")));
    client.on_auth_failed(|message| {
        sink::line(style(format!("Authentication failed: {message}")).red());
        println!(
            "Please check your {} environment variable.",
            nc_core::constants::env::API_KEY
        );
    });
    client.on_notification(sink::print_notification);
    client.on_pong(|data| sink::line(format!("Pong received: {}", sink::payload_text(data))));
    client.on_server_shutdown(|data| {
        sink::line(format!("Server is shutting down: {}", sink::payload_text(data)))
    });

    sink::line(format!("Connecting to {}...", config.server.url));
    let connected = tokio::select! {
        result = client.connect() => result,
        _ = super::ctrl_c() => {
            println!();
            sink::line("Interrupted by user");
            return Ok(());
        }
    };

    match connected {
        Ok(_) => {}
        // Already reported by the auth handler.
        Err(NcError::AuthFailed(_)) => return Ok(()),
        Err(e) => {
            error!("failed to connect: {e}");
            sink::line(style(format!("Failed to connect: {e}")).red());
            return Err(e);
        }
    }

    if let Some(room) = config.subscription.room.as_deref() {
        join_room(&mut client, room).await?;
        sink::line(format!("Subscribed to room: {room}"));
    }
    if let Some(interval) = config.health.ping_interval() {
        info!("health ping every {}s", interval.as_secs());
    }

    sink::line("Waiting for notifications (Ctrl+C to exit)...");
    println!();

    match client.wait(super::ctrl_c()).await {
        Ok(Shutdown::Interrupted) => {
            println!();
            sink::line("Interrupted by user");
            Ok(())
        }
        Ok(Shutdown::ServerClosed) => {
            sink::line("Server closed the connection");
            Ok(())
        }
        Ok(Shutdown::AuthRejected(_)) => Ok(()),
        Err(e) => {
            error!("listener stopped: {e}");
            sink::line(style(format!("Connection lost: {e}")).red());
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use nc_socket::{AuthPayload, ClientConfig, ConnectionState, TransportKind, TransportSession};
    use tokio::sync::mpsc;
    use url::Url;

    /// Accepts the handshake but drops the session pump right away.
    struct DeadSessionTransport;

    #[async_trait]
    impl Transport for DeadSessionTransport {
        async fn open(&self, _endpoint: &Url, _auth: &AuthPayload) -> NcResult<TransportSession> {
            let (outbound, _) = mpsc::unbounded_channel();
            let (_, inbound) = mpsc::unbounded_channel();
            Ok(TransportSession {
                sid: "sid-dead".into(),
                kind: TransportKind::WebSocket,
                outbound,
                inbound,
            })
        }
    }

    #[tokio::test]
    async fn test_failed_subscribe_disconnects() {
        let config = ClientConfig::new(
            "http://localhost:3001",
            AuthPayload::new("u@example.com", Some("valid-key".into())),
        );
        let mut client = NotificationClient::new(config, DeadSessionTransport);
        client.connect().await.unwrap();
        assert!(client.is_connected());

        assert!(join_room(&mut client, "room-A").await.is_err());
        assert!(!client.is_connected());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.room(), None);
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = AppConfig::default();
        config.auth.api_key = "from-env".into();

        ListenArgs {
            url: Some("notify.example.com/".into()),
            api_key: Some("from-flag".into()),
            email: Some(" u@example.com ".into()),
            room: Some("room-A".into()),
            ping_secs: Some(15),
        }
        .apply(&mut config);

        assert_eq!(config.server.url, "http://notify.example.com");
        assert_eq!(config.auth.api_key, "from-flag");
        assert_eq!(config.auth.email, "u@example.com");
        assert_eq!(config.subscription.room.as_deref(), Some("room-A"));
        assert_eq!(config.health.ping_interval(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let mut config = AppConfig::default();
        config.subscription.room = Some("python-clients".into());
        ListenArgs::default().apply(&mut config);

        assert_eq!(config.server.url, "http://localhost:3001");
        assert_eq!(config.subscription.room.as_deref(), Some("python-clients"));
        assert_eq!(config.health.ping_interval(), None);
    }

    #[test]
    fn test_blank_room_flag_clears_room() {
        let mut config = AppConfig::default();
        config.subscription.room = Some("room-A".into());
        ListenArgs {
            room: Some("".into()),
            ..ListenArgs::default()
        }
        .apply(&mut config);
        assert!(config.subscription.room.is_none());
    }
}
