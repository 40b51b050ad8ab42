//! End-to-end tests for the HTTP long-polling fallback.
//!
//! The local server refuses the websocket upgrade, so the client must fall
//! back to polling for the whole session: open packet, namespace connect with
//! auth, engine ping, a notification, room emits, and the close.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Notify};

use nc_socket::{
    AuthPayload, ClientConfig, ConnectionState, NotificationClient, NotificationEvent,
    ReconnectPolicy, Shutdown, SocketIoTransport, TransportKind, TransportSettings,
};

const OPEN_PACKET: &str =
    r#"0{"sid":"eio-poll","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

/// How long a GET is held open when there is nothing to deliver.
const HOLD: Duration = Duration::from_secs(1);

#[derive(Default)]
struct PollServer {
    pending: Mutex<VecDeque<String>>,
    ready: Notify,
    received: Mutex<Vec<String>>,
    handshakes: AtomicU32,
    refused_upgrades: AtomicU32,
}

impl PollServer {
    fn queue(&self, packet: &str) {
        self.pending.lock().unwrap().push_back(packet.to_string());
        self.ready.notify_one();
    }

    fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    fn drain(&self) -> Option<String> {
        let mut pending = self.pending.lock().unwrap();
        if pending.is_empty() {
            return None;
        }
        Some(pending.drain(..).collect::<Vec<_>>().join("\u{1e}"))
    }
}

type Params = Query<HashMap<String, String>>;

async fn poll(State(server): State<Arc<PollServer>>, Query(params): Params) -> Response {
    if params.get("transport").map(String::as_str) == Some("websocket") {
        server.refused_upgrades.fetch_add(1, Ordering::SeqCst);
        return (StatusCode::BAD_REQUEST, "websocket transport disabled").into_response();
    }
    assert_eq!(params.get("EIO").map(String::as_str), Some("4"));
    assert_eq!(params.get("transport").map(String::as_str), Some("polling"));

    if !params.contains_key("sid") {
        server.handshakes.fetch_add(1, Ordering::SeqCst);
        return OPEN_PACKET.into_response();
    }
    assert_eq!(params.get("sid").map(String::as_str), Some("eio-poll"));

    if let Some(body) = server.drain() {
        return body.into_response();
    }
    let _ = tokio::time::timeout(HOLD, server.ready.notified()).await;
    server.drain().unwrap_or_else(|| "6".to_string()).into_response()
}

async fn push(State(server): State<Arc<PollServer>>, Query(params): Params, body: String) -> Response {
    assert_eq!(params.get("sid").map(String::as_str), Some("eio-poll"));

    for packet in body.split('\u{1e}') {
        server.received.lock().unwrap().push(packet.to_string());

        if let Some(auth) = packet.strip_prefix("40") {
            let auth: Value = serde_json::from_str(auth).unwrap();
            if auth["apiKey"] == json!("valid-key") {
                server.queue(r#"40{"sid":"sio-poll"}"#);
                server.queue("2");
                server.queue(
                    r#"42["notification",{"type":"info","message":"over polling","timestamp":"2024-01-01T00:00:00Z"}]"#,
                );
            } else {
                server.queue(r#"44{"message":"Invalid API key"}"#);
            }
        }
    }
    "ok".into_response()
}

async fn spawn_server() -> (SocketAddr, Arc<PollServer>) {
    let server = Arc::new(PollServer::default());
    let app = Router::new()
        .route("/socket.io/", get(poll).post(push))
        .with_state(server.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, server)
}

fn fallback_client(addr: SocketAddr, api_key: &str) -> NotificationClient<SocketIoTransport> {
    let settings = TransportSettings {
        connect_timeout: Duration::from_secs(5),
        ..TransportSettings::default()
    };
    assert_eq!(
        settings.transports,
        vec![TransportKind::WebSocket, TransportKind::Polling]
    );
    let transport = SocketIoTransport::new(settings).unwrap();
    let config = ClientConfig::new(
        format!("http://{addr}"),
        AuthPayload::new("u@example.com", Some(api_key.to_string())),
    )
    .with_reconnect(ReconnectPolicy::disabled());
    NotificationClient::new(config, transport)
}

async fn wait_for_packet(server: &PollServer, packet: &str) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while !server.received().iter().any(|p| p == packet) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("server never received {packet:?}"));
}

#[tokio::test]
async fn e2e_falls_back_to_polling_for_the_whole_session() {
    let (addr, server) = spawn_server().await;
    let mut client = fallback_client(addr, "valid-key");

    let received = Arc::new(Mutex::new(Vec::<NotificationEvent>::new()));
    let (seen_tx, seen_rx) = oneshot::channel();
    let mut seen_tx = Some(seen_tx);
    let sink = received.clone();
    client.on_notification(move |n| {
        sink.lock().unwrap().push(n.clone());
        if let Some(tx) = seen_tx.take() {
            let _ = tx.send(());
        }
    });

    let outcome = tokio::time::timeout(Duration::from_secs(10), async {
        let connection = client.connect().await.unwrap();
        assert_eq!(connection.sid, "sio-poll");
        assert_eq!(connection.transport, TransportKind::Polling);
        client.subscribe("room-A").unwrap();
        client
            .wait(async {
                let _ = seen_rx.await;
            })
            .await
            .unwrap()
    })
    .await
    .expect("session did not finish");

    assert_eq!(outcome, Shutdown::Interrupted);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(server.refused_upgrades.load(Ordering::SeqCst), 1);
    assert_eq!(server.handshakes.load(Ordering::SeqCst), 1);

    {
        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].message, "over polling");
    }

    wait_for_packet(&server, "1").await;
    let packets = server.received();
    let auth: Value = serde_json::from_str(packets[0].strip_prefix("40").unwrap()).unwrap();
    assert_eq!(auth, json!({"email": "u@example.com", "apiKey": "valid-key"}));

    let position = |wanted: &str| packets.iter().position(|p| p == wanted);
    assert!(position("3").is_some(), "engine ping was not answered: {packets:?}");
    let subscribe = position(r#"42["subscribe","room-A"]"#).expect("subscribe not posted");
    let unsubscribe = position(r#"42["unsubscribe","room-A"]"#).expect("unsubscribe not posted");
    let disconnect = position("41").expect("namespace disconnect not posted");
    let close = position("1").expect("engine close not posted");
    assert!(subscribe < unsubscribe && unsubscribe < disconnect && disconnect < close);
}

#[tokio::test]
async fn e2e_polling_connect_error_is_an_auth_failure() {
    let (addr, server) = spawn_server().await;
    let mut client = fallback_client(addr, "wrong-key");

    let failures = Arc::new(AtomicU32::new(0));
    let seen = failures.clone();
    client.on_auth_failed(move |message| {
        assert_eq!(message, "Invalid API key");
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let result = tokio::time::timeout(Duration::from_secs(10), client.connect())
        .await
        .expect("connect did not finish");

    assert!(matches!(result, Err(nc_core::NcError::AuthFailed(_))));
    assert_eq!(client.state(), ConnectionState::AuthFailed);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(server.handshakes.load(Ordering::SeqCst), 1);
}
