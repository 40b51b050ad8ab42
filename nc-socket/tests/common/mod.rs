//! Shared test utilities for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use url::Url;

use nc_core::{NcError, NcResult};
use nc_socket::transport::{Outbound, Transport, TransportSession};
use nc_socket::{AuthPayload, ClientConfig, InboundEvent, ReconnectPolicy, TransportKind};

/// What the next `open` call does.
#[derive(Debug, Clone)]
pub enum Outcome {
    Accept,
    /// Reply with a connect error (credentials rejected).
    Reject(String),
    /// Fail like an unreachable server.
    Fail(String),
}

/// An event emitted by the client, tagged with the session that carried it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub session: u32,
    pub event: String,
    pub data: Option<Value>,
}

#[derive(Default)]
struct State {
    outcomes: VecDeque<Outcome>,
    scripts: VecDeque<Vec<InboundEvent>>,
    opens: u32,
    auths: Vec<AuthPayload>,
    sent: Vec<Sent>,
    closes: u32,
    inbound: Option<mpsc::UnboundedSender<InboundEvent>>,
}

/// In-memory transport driven by a queue of outcomes.
///
/// Accepted sessions record every outbound emit and acknowledge close
/// requests; tests inject server events with `push` or `script_session`.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<State>>,
}

impl ScriptedTransport {
    pub fn new(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        let transport = Self::default();
        transport.state.lock().unwrap().outcomes.extend(outcomes);
        transport
    }

    /// Events delivered as soon as the next accepted session opens.
    pub fn script_session(&self, events: Vec<InboundEvent>) {
        self.state.lock().unwrap().scripts.push_back(events);
    }

    /// Deliver an event on the current session. Returns false if none is open.
    pub fn push(&self, event: InboundEvent) -> bool {
        match &self.state.lock().unwrap().inbound {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Simulate the network dropping the current session.
    pub fn drop_connection(&self, reason: &str) {
        if let Some(tx) = self.state.lock().unwrap().inbound.take() {
            let _ = tx.send(InboundEvent::TransportClosed(reason.to_string()));
        }
    }

    pub fn opens(&self) -> u32 {
        self.state.lock().unwrap().opens
    }

    pub fn closes(&self) -> u32 {
        self.state.lock().unwrap().closes
    }

    pub fn auths(&self) -> Vec<AuthPayload> {
        self.state.lock().unwrap().auths.clone()
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Names of the emitted events, in order.
    pub fn sent_names(&self) -> Vec<String> {
        self.sent().into_iter().map(|s| s.event).collect()
    }

    /// Wait until at least `count` events have been recorded.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<Sent> {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let sent = self.sent();
                if sent.len() >= count {
                    return sent;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for emitted events")
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, _endpoint: &Url, auth: &AuthPayload) -> NcResult<TransportSession> {
        let mut state = self.state.lock().unwrap();
        state.opens += 1;
        state.auths.push(auth.clone());
        let session = state.opens;

        match state.outcomes.pop_front().unwrap_or(Outcome::Accept) {
            Outcome::Reject(message) => Err(NcError::AuthFailed(message)),
            Outcome::Fail(message) => Err(NcError::Connection(message)),
            Outcome::Accept => {
                let (out_tx, mut out_rx) = mpsc::unbounded_channel();
                let (in_tx, in_rx) = mpsc::unbounded_channel();

                if let Some(events) = state.scripts.pop_front() {
                    for event in events {
                        let _ = in_tx.send(event);
                    }
                }
                state.inbound = Some(in_tx);

                let shared = self.state.clone();
                tokio::spawn(async move {
                    while let Some(command) = out_rx.recv().await {
                        match command {
                            Outbound::Emit { event, data } => {
                                shared.lock().unwrap().sent.push(Sent { session, event, data });
                            }
                            Outbound::Close(ack) => {
                                {
                                    let mut state = shared.lock().unwrap();
                                    state.closes += 1;
                                    state.inbound = None;
                                }
                                let _ = ack.send(());
                                break;
                            }
                        }
                    }
                });

                Ok(TransportSession {
                    sid: format!("sid-{session}"),
                    kind: TransportKind::WebSocket,
                    outbound: out_tx,
                    inbound: in_rx,
                })
            }
        }
    }
}

/// Reconnect policy with millisecond delays and no jitter.
pub fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        enabled: true,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        max_attempts,
        jitter_factor: 0.0,
    }
}

/// Client configuration pointing at a local server with a valid key.
pub fn create_test_config() -> ClientConfig {
    ClientConfig::new(
        "http://localhost:3001",
        AuthPayload::new("rust-client@example.com", Some("valid-key".into())),
    )
    .with_reconnect(fast_policy(3))
}

/// A `notification` event as the server would send it.
pub fn notification(kind: &str, message: &str) -> InboundEvent {
    InboundEvent::from_wire(
        "notification",
        vec![json!({
            "type": kind,
            "title": "Test",
            "message": message,
            "timestamp": "2024-06-01T12:00:00Z"
        })],
    )
}
