//! Engine.IO over a WebSocket.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async;
use tracing::{debug, warn};
use url::Url;

use nc_core::error::{NcError, NcResult};

use crate::events::TransportKind;
use crate::protocol::EnginePacket;
use crate::transport::engine::{expect_open, EngineChannel};

pub(crate) fn ws_error(e: tokio_tungstenite::tungstenite::Error) -> NcError {
    NcError::WebSocket(e.to_string())
}

/// Open a websocket Engine.IO session and wait for the open packet.
pub async fn open(
    url: &Url,
    headers: &HashMap<String, String>,
    timeout: Duration,
) -> NcResult<EngineChannel> {
    let mut request = url.as_str().into_client_request().map_err(ws_error)?;
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| NcError::Config(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| NcError::Config(format!("invalid header value: {e}")))?;
        request.headers_mut().insert(name, value);
    }

    debug!("opening websocket {url}");
    let (mut ws, _response) = tokio::time::timeout(timeout, connect_async(request))
        .await
        .map_err(|_| NcError::Timeout(format!("websocket connect to {url}")))?
        .map_err(ws_error)?;

    let handshake = tokio::time::timeout(timeout, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return EnginePacket::decode(text.as_str()).and_then(expect_open);
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(NcError::Connection("websocket closed during handshake".into()));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ws_error(e)),
            }
        }
    })
    .await
    .map_err(|_| NcError::Timeout("engine.io open packet".into()))??;

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<EnginePacket>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<NcResult<EnginePacket>>();

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => match EnginePacket::decode(text.as_str()) {
                        Ok(packet) => {
                            if in_tx.send(Ok(packet)).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("dropping websocket frame: {e}"),
                    },
                    Some(Ok(Message::Binary(_))) => debug!("ignoring binary websocket frame"),
                    Some(Ok(Message::Close(frame))) => {
                        debug!("websocket closed by server: {frame:?}");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = in_tx.send(Err(ws_error(e)));
                        break;
                    }
                    None => break,
                },
                packet = out_rx.recv() => match packet {
                    Some(packet) => {
                        if let Err(e) = ws.send(Message::text(packet.encode())).await {
                            let _ = in_tx.send(Err(ws_error(e)));
                            break;
                        }
                    }
                    None => {
                        let _ = ws.close(None).await;
                        break;
                    }
                },
            }
        }
        debug!("websocket task finished");
    });

    Ok(EngineChannel::new(
        handshake,
        TransportKind::WebSocket,
        out_tx,
        in_rx,
        task,
        None,
    ))
}
