//! Transports carrying Socket.IO sessions.
//!
//! A `Transport` performs the handshake (Engine.IO open, then Socket.IO
//! CONNECT with the auth payload) and hands back a `TransportSession`: an
//! outbound command channel plus an ordered inbound event channel fed by a
//! background pump task.

pub mod engine;
pub mod polling;
pub mod websocket;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use url::Url;

use nc_core::config::ServerConfig;
use nc_core::constants::events;
use nc_core::error::{NcError, NcResult};

use crate::events::{AuthPayload, InboundEvent, TransportKind};
use crate::protocol::{error_message, EnginePacket, SocketPacket};
use engine::{engine_url, EngineChannel};

/// A command from the client to the session pump.
#[derive(Debug)]
pub enum Outbound {
    /// Emit an event; `data` of None sends the bare event name.
    Emit { event: String, data: Option<serde_json::Value> },
    /// Leave the namespace and close the connection; the sender is
    /// signalled once the close has been flushed.
    Close(oneshot::Sender<()>),
}

/// A live, authenticated session.
#[derive(Debug)]
pub struct TransportSession {
    /// Socket.IO session id.
    pub sid: String,
    pub kind: TransportKind,
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub inbound: mpsc::UnboundedReceiver<InboundEvent>,
}

/// Opens authenticated sessions to a notification server.
///
/// Implementations report an explicit credential rejection as
/// `NcError::AuthFailed` and network trouble as a transient error so the
/// client can tell which failures are worth retrying.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, endpoint: &Url, auth: &AuthPayload) -> NcResult<TransportSession>;
}

/// Settings for `SocketIoTransport`.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub namespace: String,
    pub path: String,
    /// Transports to try, in order.
    pub transports: Vec<TransportKind>,
    pub connect_timeout: Duration,
    pub headers: HashMap<String, String>,
}

impl TransportSettings {
    pub fn from_config(config: &ServerConfig) -> NcResult<Self> {
        let transports = config
            .transports
            .iter()
            .map(|t| t.parse::<TransportKind>())
            .collect::<NcResult<Vec<_>>>()?;
        if transports.is_empty() {
            return Err(NcError::Config("at least one transport is required".into()));
        }

        let namespace = if config.namespace.starts_with('/') {
            config.namespace.clone()
        } else {
            format!("/{}", config.namespace)
        };

        Ok(Self {
            namespace,
            path: config.path.clone(),
            transports,
            connect_timeout: config.connect_timeout(),
            headers: config.custom_headers.clone(),
        })
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        let config = ServerConfig::default();
        Self {
            namespace: config.namespace,
            path: config.path,
            transports: vec![TransportKind::WebSocket, TransportKind::Polling],
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            headers: config.custom_headers,
        }
    }
}

/// Socket.IO client transport: websocket preferred, long-polling fallback.
pub struct SocketIoTransport {
    settings: TransportSettings,
    http: reqwest::Client,
}

impl SocketIoTransport {
    pub fn new(settings: TransportSettings) -> NcResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| NcError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { settings, http })
    }

    pub fn from_config(config: &ServerConfig) -> NcResult<Self> {
        Self::new(TransportSettings::from_config(config)?)
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    async fn open_engine(&self, endpoint: &Url) -> NcResult<EngineChannel> {
        let mut last_error = None;

        for kind in &self.settings.transports {
            let attempt = match kind {
                TransportKind::WebSocket => {
                    let url = engine_url(endpoint, &self.settings.path, *kind, None)?;
                    websocket::open(&url, &self.settings.headers, self.settings.connect_timeout).await
                }
                TransportKind::Polling => {
                    polling::open(
                        &self.http,
                        endpoint,
                        &self.settings.path,
                        &self.settings.headers,
                        self.settings.connect_timeout,
                    )
                    .await
                }
            };

            match attempt {
                Ok(channel) => return Ok(channel),
                Err(e) => {
                    warn!("{kind} transport failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| NcError::Config("no transports configured".into())))
    }
}

#[async_trait]
impl Transport for SocketIoTransport {
    async fn open(&self, endpoint: &Url, auth: &AuthPayload) -> NcResult<TransportSession> {
        let mut engine = self.open_engine(endpoint).await?;
        let namespace = self.settings.namespace.clone();

        let connect = SocketPacket::Connect {
            namespace: namespace.clone(),
            data: Some(serde_json::to_value(auth)?),
        };
        engine.send(EnginePacket::Message(connect.encode()))?;

        let joined = tokio::time::timeout(
            self.settings.connect_timeout,
            await_namespace_connect(&mut engine, &namespace),
        )
        .await
        .unwrap_or_else(|_| Err(NcError::Timeout("socket.io connect".into())));

        let sid = match joined {
            Ok(sid) => sid,
            Err(e) => {
                engine.close().await;
                return Err(e);
            }
        };

        info!("socket.io session {sid} open over {}", engine.kind);

        let kind = engine.kind;
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(engine, namespace, out_rx, in_tx));

        Ok(TransportSession {
            sid,
            kind,
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Wait for the server's answer to our CONNECT packet.
async fn await_namespace_connect(engine: &mut EngineChannel, namespace: &str) -> NcResult<String> {
    loop {
        let packet = match engine.recv().await {
            Some(packet) => packet?,
            None => {
                return Err(NcError::Connection("connection closed during handshake".into()));
            }
        };

        match packet {
            EnginePacket::Ping(data) => engine.send(EnginePacket::Pong(data))?,
            EnginePacket::Close => {
                return Err(NcError::Connection("server closed the session during handshake".into()));
            }
            EnginePacket::Message(text) => match SocketPacket::decode(&text)? {
                SocketPacket::Connect { namespace: ns, data } if ns == namespace => {
                    let sid = data
                        .as_ref()
                        .and_then(|d| d.get("sid"))
                        .and_then(|s| s.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| engine.handshake.sid.clone());
                    return Ok(sid);
                }
                SocketPacket::ConnectError { data, .. } => {
                    return Err(NcError::AuthFailed(error_message(&data)));
                }
                SocketPacket::Event { name, args, .. } if name == events::AUTH_ERROR => {
                    let message = args.first().map(error_message).unwrap_or_else(|| "Unknown error".into());
                    return Err(NcError::AuthFailed(message));
                }
                other => debug!("ignoring {other:?} before namespace connect"),
            },
            other => debug!("ignoring {other:?} during handshake"),
        }
    }
}

/// Move packets between the engine session and the client until either side closes.
async fn pump(
    mut engine: EngineChannel,
    namespace: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::UnboundedSender<InboundEvent>,
) {
    let window = engine.handshake.liveness_window();
    let deadline = sleep(window);
    tokio::pin!(deadline);

    let mut close_ack = None;

    loop {
        tokio::select! {
            packet = engine.recv() => {
                deadline.as_mut().reset(Instant::now() + window);
                match packet {
                    Some(Ok(EnginePacket::Ping(data))) => {
                        if let Err(e) = engine.send(EnginePacket::Pong(data)) {
                            let _ = inbound.send(InboundEvent::TransportClosed(e.to_string()));
                            break;
                        }
                    }
                    Some(Ok(EnginePacket::Message(text))) => match SocketPacket::decode(&text) {
                        Ok(SocketPacket::Event { namespace: ns, name, args, .. }) if ns == namespace => {
                            if inbound.send(InboundEvent::from_wire(&name, args)).is_err() {
                                break;
                            }
                        }
                        Ok(SocketPacket::Disconnect { namespace: ns }) if ns == namespace => {
                            info!("server closed namespace {namespace}");
                            let _ = inbound.send(InboundEvent::ServerDisconnect);
                            break;
                        }
                        Ok(other) => debug!("ignoring socket.io packet {other:?}"),
                        Err(e) => warn!("dropping undecodable socket.io packet: {e}"),
                    },
                    Some(Ok(EnginePacket::Close)) => {
                        let _ = inbound.send(InboundEvent::TransportClosed("server closed the connection".into()));
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = inbound.send(InboundEvent::TransportClosed(e.to_string()));
                        break;
                    }
                    None => {
                        let _ = inbound.send(InboundEvent::TransportClosed("connection closed".into()));
                        break;
                    }
                }
            }
            command = outbound.recv() => match command {
                Some(Outbound::Emit { event, data }) => {
                    let packet = SocketPacket::event(&namespace, &event, data);
                    if let Err(e) = engine.send(EnginePacket::Message(packet.encode())) {
                        let _ = inbound.send(InboundEvent::TransportClosed(e.to_string()));
                        break;
                    }
                }
                Some(Outbound::Close(ack)) => {
                    let disconnect = SocketPacket::Disconnect { namespace: namespace.clone() };
                    let _ = engine.send(EnginePacket::Message(disconnect.encode()));
                    close_ack = Some(ack);
                    break;
                }
                None => {
                    let disconnect = SocketPacket::Disconnect { namespace: namespace.clone() };
                    let _ = engine.send(EnginePacket::Message(disconnect.encode()));
                    break;
                }
            },
            _ = &mut deadline => {
                warn!("no traffic from server for {:?}, treating connection as lost", window);
                let _ = inbound.send(InboundEvent::TransportClosed("ping timeout".into()));
                break;
            }
        }
    }

    engine.close().await;
    if let Some(ack) = close_ack {
        let _ = ack.send(());
    }
    debug!("session pump for {namespace} finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_default_config() {
        let settings = TransportSettings::default();
        assert_eq!(
            settings.transports,
            vec![TransportKind::WebSocket, TransportKind::Polling]
        );
        assert_eq!(settings.namespace, "/");
        assert_eq!(settings.path, "/socket.io/");
    }

    #[test]
    fn test_settings_normalize_namespace() {
        let config = ServerConfig {
            namespace: "notifications".into(),
            transports: vec!["polling".into()],
            ..ServerConfig::default()
        };
        let settings = TransportSettings::from_config(&config).unwrap();
        assert_eq!(settings.namespace, "/notifications");
        assert_eq!(settings.transports, vec![TransportKind::Polling]);
    }

    #[test]
    fn test_settings_reject_unknown_transport() {
        let config = ServerConfig {
            transports: vec!["smoke-signals".into()],
            ..ServerConfig::default()
        };
        assert!(matches!(
            TransportSettings::from_config(&config),
            Err(NcError::Config(_))
        ));
    }
}
