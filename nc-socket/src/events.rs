//! Event and session types exchanged between the transport and the client.
//!
//! The transport decodes wire events into `InboundEvent` values and pushes
//! them onto a channel; the client consumes that channel in arrival order.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use nc_core::config::AuthConfig;
use nc_core::constants::events;

use crate::protocol::error_message;

/// A notification pushed by the server.
///
/// Decoding is lenient: null fields fall back to their defaults and
/// non-string scalars (a numeric timestamp, say) are kept as their JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Notification type tag, e.g. "info" or "dataset:parsed".
    #[serde(rename = "type", default = "default_kind", deserialize_with = "kind_or_default")]
    pub kind: String,
    /// Optional headline.
    #[serde(default, deserialize_with = "loose_text", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Body text.
    #[serde(default, deserialize_with = "text_or_empty")]
    pub message: String,
    /// Optional structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Timestamp as sent by the server, usually ISO 8601.
    #[serde(default, deserialize_with = "loose_text", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

fn default_kind() -> String {
    "unknown".to_string()
}

fn value_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn loose_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_text(Value::deserialize(deserializer)?))
}

fn text_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(loose_text(deserializer)?.unwrap_or_default())
}

fn kind_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(loose_text(deserializer)?.unwrap_or_else(default_kind))
}

impl NotificationEvent {
    /// Parse the timestamp as RFC 3339, if present and well-formed.
    pub fn parsed_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
    }

    /// Title, ignoring empty strings.
    pub fn display_title(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.is_empty())
    }
}

/// An event decoded from the server, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// `notification`.
    Notification(NotificationEvent),
    /// `pong`, with whatever payload the server attached.
    Pong(Value),
    /// `auth:error`, carrying the server's message.
    AuthError(String),
    /// `server:shutdown`.
    ServerShutdown(Value),
    /// Any other event name.
    Other { name: String, data: Value },
    /// The server closed the namespace (Socket.IO DISCONNECT).
    ServerDisconnect,
    /// The underlying connection was lost.
    TransportClosed(String),
}

impl InboundEvent {
    /// Map a Socket.IO event name and its arguments to a typed event.
    pub fn from_wire(name: &str, mut args: Vec<Value>) -> Self {
        let first = if args.is_empty() {
            Value::Null
        } else {
            args.remove(0)
        };

        match name {
            events::NOTIFICATION => match serde_json::from_value::<NotificationEvent>(first.clone()) {
                Ok(notification) => Self::Notification(notification),
                Err(e) => {
                    warn!("malformed notification payload: {e}");
                    Self::Other {
                        name: name.to_string(),
                        data: first,
                    }
                }
            },
            events::PONG => Self::Pong(first),
            events::AUTH_ERROR => Self::AuthError(error_message(&first)),
            events::SERVER_SHUTDOWN => Self::ServerShutdown(first),
            other => Self::Other {
                name: other.to_string(),
                data: first,
            },
        }
    }
}

/// Authentication object sent in the Socket.IO CONNECT packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub email: String,
    #[serde(rename = "apiKey", default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl AuthPayload {
    pub fn new(email: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            email: email.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

impl From<&AuthConfig> for AuthPayload {
    fn from(config: &AuthConfig) -> Self {
        Self::new(config.email.clone(), Some(config.api_key.clone()))
    }
}

/// Which Engine.IO transport carries a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[serde(rename = "websocket")]
    WebSocket,
    Polling,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::Polling => "polling",
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = nc_core::NcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Ok(Self::WebSocket),
            "polling" => Ok(Self::Polling),
            other => Err(nc_core::NcError::Config(format!("unknown transport '{other}'"))),
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical session with the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    /// Session id assigned by the server on connect.
    pub sid: String,
    pub connected: bool,
    /// The payload the session authenticated with.
    pub auth: AuthPayload,
    pub transport: TransportKind,
    pub connected_at: DateTime<Utc>,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called.
    ClientRequested,
    /// The server closed the namespace.
    ServerClosed,
    /// The server rejected the credentials after connecting.
    AuthRejected,
    /// The connection dropped.
    TransportLost(String),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientRequested => write!(f, "client disconnect"),
            Self::ServerClosed => write!(f, "server disconnect"),
            Self::AuthRejected => write!(f, "authentication rejected"),
            Self::TransportLost(reason) => write!(f, "transport lost: {reason}"),
        }
    }
}

/// Connection state of a `NotificationClient`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying to connect.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Connected and receiving events.
    Connected,
    /// Connection lost, retrying.
    Reconnecting,
    /// The server rejected the credentials; no automatic retry.
    AuthFailed,
    /// Retries exhausted.
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::AuthFailed => write!(f, "auth_failed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
