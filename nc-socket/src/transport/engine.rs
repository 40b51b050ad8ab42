//! Engine.IO session plumbing shared by the websocket and polling transports.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

use nc_core::error::{NcError, NcResult};

use crate::events::TransportKind;
use crate::protocol::{EnginePacket, OpenHandshake, ENGINE_IO_VERSION};

/// How long `close` waits for queued packets to be flushed.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// An open Engine.IO session.
///
/// Background tasks own the socket; this handle exchanges packets with them
/// over channels so the Socket.IO layer is transport-agnostic.
pub struct EngineChannel {
    pub handshake: OpenHandshake,
    pub kind: TransportKind,
    tx: mpsc::UnboundedSender<EnginePacket>,
    rx: mpsc::UnboundedReceiver<NcResult<EnginePacket>>,
    writer: JoinHandle<()>,
    reader: Option<JoinHandle<()>>,
}

impl EngineChannel {
    pub(crate) fn new(
        handshake: OpenHandshake,
        kind: TransportKind,
        tx: mpsc::UnboundedSender<EnginePacket>,
        rx: mpsc::UnboundedReceiver<NcResult<EnginePacket>>,
        writer: JoinHandle<()>,
        reader: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            handshake,
            kind,
            tx,
            rx,
            writer,
            reader,
        }
    }

    /// Queue a packet for sending.
    pub fn send(&self, packet: EnginePacket) -> NcResult<()> {
        self.tx
            .send(packet)
            .map_err(|_| NcError::Connection(format!("{} transport is closed", self.kind)))
    }

    /// Next packet from the server; None once the transport has shut down.
    pub async fn recv(&mut self) -> Option<NcResult<EnginePacket>> {
        self.rx.recv().await
    }

    /// Send an Engine.IO close, flush pending packets, and stop the background tasks.
    pub async fn close(self) {
        let _ = self.tx.send(EnginePacket::Close);
        drop(self.tx);

        if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, self.writer).await.is_err() {
            debug!("{} writer did not finish flushing before close timeout", self.kind);
        }
        if let Some(reader) = self.reader {
            reader.abort();
        }
    }
}

/// Build the Engine.IO endpoint URL for a transport.
///
/// The endpoint's own path is replaced by the Socket.IO path; websocket
/// sessions switch the scheme to `ws`/`wss`.
pub fn engine_url(
    endpoint: &Url,
    path: &str,
    kind: TransportKind,
    sid: Option<&str>,
) -> NcResult<Url> {
    let mut url = endpoint.clone();

    let path = format!("/{}/", path.trim_matches('/'));
    url.set_path(&path);
    url.set_fragment(None);

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        query.append_pair("EIO", ENGINE_IO_VERSION);
        query.append_pair("transport", kind.as_str());
        if let Some(sid) = sid {
            query.append_pair("sid", sid);
        }
    }

    let scheme = match (kind, url.scheme()) {
        (TransportKind::WebSocket, "http" | "ws") => "ws",
        (TransportKind::WebSocket, "https" | "wss") => "wss",
        (TransportKind::Polling, "http" | "ws") => "http",
        (TransportKind::Polling, "https" | "wss") => "https",
        (_, other) => {
            return Err(NcError::InvalidUrl(format!("unsupported scheme '{other}'")));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| NcError::InvalidUrl(format!("cannot switch {endpoint} to {scheme}")))?;

    Ok(url)
}

/// Expect the first packet of a session to be an open packet and parse it.
pub fn expect_open(packet: EnginePacket) -> NcResult<OpenHandshake> {
    match packet {
        EnginePacket::Open(data) => OpenHandshake::parse(&data),
        other => Err(NcError::Protocol(format!(
            "expected engine.io open packet, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_url_websocket() {
        let endpoint = Url::parse("http://localhost:3001").unwrap();
        let url = engine_url(&endpoint, "/socket.io/", TransportKind::WebSocket, None).unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:3001/socket.io/?EIO=4&transport=websocket"
        );

        let secure = Url::parse("https://notify.example.com/app?x=1").unwrap();
        let url = engine_url(&secure, "socket.io", TransportKind::WebSocket, None).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://notify.example.com/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_engine_url_polling_with_sid() {
        let endpoint = Url::parse("wss://notify.example.com").unwrap();
        let url = engine_url(&endpoint, "/rt/", TransportKind::Polling, Some("abc")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://notify.example.com/rt/?EIO=4&transport=polling&sid=abc"
        );
    }

    #[test]
    fn test_expect_open() {
        let hs = expect_open(EnginePacket::Open(
            r#"{"sid":"s","pingInterval":1,"pingTimeout":2}"#.into(),
        ))
        .unwrap();
        assert_eq!(hs.sid, "s");
        assert!(expect_open(EnginePacket::Noop).is_err());
    }
}
