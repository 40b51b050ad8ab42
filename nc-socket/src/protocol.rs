//! Engine.IO v4 and Socket.IO v5 packet codec.
//!
//! Engine.IO frames the connection (`0` open, `1` close, `2` ping, `3` pong,
//! `4` message, `5` upgrade, `6` noop). Socket.IO packets travel inside
//! Engine.IO message packets and use the layout
//! `<type>[<namespace>,][<ack id>][<json>]`.

use serde::Deserialize;
use serde_json::Value;

use nc_core::error::{NcError, NcResult};

/// Engine.IO protocol revision spoken by this client.
pub const ENGINE_IO_VERSION: &str = "4";

/// Separator between packets in an HTTP long-polling payload.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// An Engine.IO packet. Binary packets are not supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    /// Handshake data from the server.
    Open(String),
    Close,
    Ping(String),
    Pong(String),
    /// Carries an encoded Socket.IO packet.
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    /// Decode a single text packet.
    pub fn decode(raw: &str) -> NcResult<Self> {
        let mut chars = raw.chars();
        let kind = chars
            .next()
            .ok_or_else(|| NcError::Protocol("empty engine.io packet".into()))?;
        let body = chars.as_str().to_string();

        match kind {
            '0' => Ok(Self::Open(body)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(body)),
            '3' => Ok(Self::Pong(body)),
            '4' => Ok(Self::Message(body)),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            'b' => Err(NcError::Protocol("binary engine.io packets are not supported".into())),
            other => Err(NcError::Protocol(format!(
                "unknown engine.io packet type '{other}'"
            ))),
        }
    }

    /// Encode as a text packet.
    pub fn encode(&self) -> String {
        match self {
            Self::Open(data) => format!("0{data}"),
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

/// Split a long-polling response body into packets.
///
/// Packets that fail to decode are skipped with a warning so one bad frame
/// does not drop the whole batch.
pub fn decode_payload(body: &str) -> Vec<EnginePacket> {
    body.split(RECORD_SEPARATOR)
        .filter(|chunk| !chunk.is_empty())
        .filter_map(|chunk| match EnginePacket::decode(chunk) {
            Ok(packet) => Some(packet),
            Err(e) => {
                tracing::warn!("skipping polling packet: {e}");
                None
            }
        })
        .collect()
}

/// Join packets into a long-polling request body.
pub fn encode_payload(packets: &[EnginePacket]) -> String {
    packets
        .iter()
        .map(EnginePacket::encode)
        .collect::<Vec<_>>()
        .join(&RECORD_SEPARATOR.to_string())
}

/// Upper bound on the silence tolerated from a server.
pub const MAX_LIVENESS_WINDOW: std::time::Duration = std::time::Duration::from_secs(10 * 60);

/// Handshake data carried by the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    /// Engine.IO session id.
    pub sid: String,
    /// Transports the server allows upgrading to.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
    /// Largest payload the server accepts, in bytes.
    #[serde(default)]
    pub max_payload: Option<u64>,
}

impl OpenHandshake {
    /// Parse the JSON body of an open packet.
    pub fn parse(data: &str) -> NcResult<Self> {
        serde_json::from_str(data)
            .map_err(|e| NcError::Protocol(format!("invalid engine.io handshake: {e}")))
    }

    /// How long the connection may stay silent before it is considered dead.
    ///
    /// Capped at `MAX_LIVENESS_WINDOW` whatever the server advertises.
    pub fn liveness_window(&self) -> std::time::Duration {
        let millis = self.ping_interval.saturating_add(self.ping_timeout);
        std::time::Duration::from_millis(millis).min(MAX_LIVENESS_WINDOW)
    }
}

/// A Socket.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Value,
    },
}

impl SocketPacket {
    /// Build an event packet. `data` of None sends the bare event name.
    pub fn event(namespace: &str, name: &str, data: Option<Value>) -> Self {
        Self::Event {
            namespace: namespace.to_string(),
            id: None,
            name: name.to_string(),
            args: data.into_iter().collect(),
        }
    }

    fn type_digit(&self) -> char {
        match self {
            Self::Connect { .. } => '0',
            Self::Disconnect { .. } => '1',
            Self::Event { .. } => '2',
            Self::Ack { .. } => '3',
            Self::ConnectError { .. } => '4',
        }
    }

    fn namespace(&self) -> &str {
        match self {
            Self::Connect { namespace, .. }
            | Self::Disconnect { namespace }
            | Self::Event { namespace, .. }
            | Self::Ack { namespace, .. }
            | Self::ConnectError { namespace, .. } => namespace,
        }
    }

    /// Encode to the text carried inside an Engine.IO message packet.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.type_digit());

        let namespace = self.namespace();
        if !namespace.is_empty() && namespace != "/" {
            out.push_str(namespace);
            out.push(',');
        }

        match self {
            Self::Connect { data, .. } => {
                if let Some(data) = data {
                    out.push_str(&data.to_string());
                }
            }
            Self::Disconnect { .. } => {}
            Self::Event { id, name, args, .. } => {
                if let Some(id) = id {
                    out.push_str(&id.to_string());
                }
                let mut array = Vec::with_capacity(args.len() + 1);
                array.push(Value::String(name.clone()));
                array.extend(args.iter().cloned());
                out.push_str(&Value::Array(array).to_string());
            }
            Self::Ack { id, args, .. } => {
                out.push_str(&id.to_string());
                out.push_str(&Value::Array(args.clone()).to_string());
            }
            Self::ConnectError { data, .. } => out.push_str(&data.to_string()),
        }
        out
    }

    /// Decode the text of an Engine.IO message packet.
    pub fn decode(raw: &str) -> NcResult<Self> {
        let mut chars = raw.chars();
        let kind = chars
            .next()
            .ok_or_else(|| NcError::Protocol("empty socket.io packet".into()))?;
        let mut rest = chars.as_str();

        if matches!(kind, '5' | '6') {
            return Err(NcError::Protocol("binary socket.io packets are not supported".into()));
        }

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(idx) => {
                    let ns = rest[..idx].to_string();
                    rest = &rest[idx + 1..];
                    ns
                }
                None => {
                    let ns = rest.to_string();
                    rest = "";
                    ns
                }
            }
        } else {
            "/".to_string()
        };

        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let id = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|e| NcError::Protocol(format!("invalid ack id: {e}")))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data: Option<Value> = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest).map_err(|e| {
                NcError::Protocol(format!("invalid socket.io payload: {e}"))
            })?)
        };

        match kind {
            '0' => Ok(Self::Connect { namespace, data }),
            '1' => Ok(Self::Disconnect { namespace }),
            '2' => {
                let mut args = match data {
                    Some(Value::Array(items)) => items,
                    _ => return Err(NcError::Protocol("event payload must be an array".into())),
                };
                if args.is_empty() {
                    return Err(NcError::Protocol("event payload has no name".into()));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(NcError::Protocol(format!("event name must be a string, got {other}")));
                    }
                };
                Ok(Self::Event { namespace, id, name, args })
            }
            '3' => {
                let id = id.ok_or_else(|| NcError::Protocol("ack without id".into()))?;
                let args = match data {
                    Some(Value::Array(items)) => items,
                    Some(other) => vec![other],
                    None => Vec::new(),
                };
                Ok(Self::Ack { namespace, id, args })
            }
            '4' => Ok(Self::ConnectError {
                namespace,
                data: data.unwrap_or(Value::Null),
            }),
            other => Err(NcError::Protocol(format!(
                "unknown socket.io packet type '{other}'"
            ))),
        }
    }
}

/// Pull a human-readable message out of an error payload.
///
/// Accepts `{"message": "..."}`, a bare string, or anything else.
pub fn error_message(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string(),
        _ => "Unknown error".to_string(),
    }
}
