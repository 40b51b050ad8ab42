//! Engine.IO over HTTP long-polling.
//!
//! One task keeps a GET outstanding to receive packets; another batches
//! outbound packets into POST requests.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use nc_core::error::{NcError, NcResult};

use crate::events::TransportKind;
use crate::protocol::{decode_payload, encode_payload, EnginePacket};
use crate::transport::engine::{engine_url, expect_open, EngineChannel};

/// Extra time allowed on top of the server's ping window for a poll to return.
const POLL_SLACK: Duration = Duration::from_secs(5);

pub(crate) fn http_error(e: reqwest::Error) -> NcError {
    if e.is_timeout() {
        NcError::Timeout(e.to_string())
    } else {
        NcError::Http(e.to_string())
    }
}

fn header_map(headers: &HashMap<String, String>) -> NcResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| NcError::Config(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| NcError::Config(format!("invalid header value: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

async fn poll(client: &Client, url: &Url, headers: &HeaderMap, timeout: Duration) -> NcResult<String> {
    client
        .get(url.clone())
        .headers(headers.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(http_error)?
        .error_for_status()
        .map_err(http_error)?
        .text()
        .await
        .map_err(http_error)
}

async fn post(client: &Client, url: &Url, headers: &HeaderMap, body: String) -> NcResult<()> {
    client
        .post(url.clone())
        .headers(headers.clone())
        .header(reqwest::header::CONTENT_TYPE, "text/plain;charset=UTF-8")
        .body(body)
        .send()
        .await
        .map_err(http_error)?
        .error_for_status()
        .map_err(http_error)?;
    Ok(())
}

/// Open a long-polling Engine.IO session against `endpoint` and wait for the open packet.
pub async fn open(
    client: &Client,
    endpoint: &Url,
    path: &str,
    headers: &HashMap<String, String>,
    timeout: Duration,
) -> NcResult<EngineChannel> {
    let headers = header_map(headers)?;
    let url = engine_url(endpoint, path, TransportKind::Polling, None)?;

    debug!("opening polling session {url}");
    let body = poll(client, &url, &headers, timeout).await?;
    let mut packets = decode_payload(&body).into_iter();
    let first = packets
        .next()
        .ok_or_else(|| NcError::Protocol("empty polling handshake response".into()))?;
    let handshake = expect_open(first)?;

    let session_url = engine_url(endpoint, path, TransportKind::Polling, Some(&handshake.sid))?;
    let poll_timeout = handshake.liveness_window() + POLL_SLACK;

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<EnginePacket>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<NcResult<EnginePacket>>();

    for packet in packets {
        let _ = in_tx.send(Ok(packet));
    }

    let reader = {
        let client = client.clone();
        let url = session_url.clone();
        let headers = headers.clone();
        let in_tx = in_tx.clone();
        tokio::spawn(async move {
            while !in_tx.is_closed() {
                match poll(&client, &url, &headers, poll_timeout).await {
                    Ok(body) => {
                        for packet in decode_payload(&body) {
                            let closing = packet == EnginePacket::Close;
                            if in_tx.send(Ok(packet)).is_err() || closing {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = in_tx.send(Err(e));
                        return;
                    }
                }
            }
        })
    };

    let writer = {
        let client = client.clone();
        let url = session_url;
        tokio::spawn(async move {
            while let Some(first) = out_rx.recv().await {
                let mut batch = vec![first];
                while let Ok(packet) = out_rx.try_recv() {
                    batch.push(packet);
                }
                if let Err(e) = post(&client, &url, &headers, encode_payload(&batch)).await {
                    warn!("polling post failed: {e}");
                    let _ = in_tx.send(Err(e));
                    break;
                }
            }
            debug!("polling writer finished");
        })
    };

    Ok(EngineChannel::new(
        handshake,
        TransportKind::Polling,
        out_tx,
        in_rx,
        writer,
        Some(reader),
    ))
}
