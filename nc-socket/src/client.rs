//! Notification client: one outbound session and the dispatch of its events.
//!
//! The transport's pump task pushes typed events onto a channel; `wait` is
//! the single consumer and runs handlers sequentially in arrival order.
//! Every mutating operation takes `&mut self`, so the client needs no locks.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use url::Url;

use nc_core::config::AppConfig;
use nc_core::constants::events;
use nc_core::error::{NcError, NcResult};

use crate::events::{
    AuthPayload, Connection, ConnectionState, DisconnectReason, InboundEvent, NotificationEvent,
};
use crate::health::{Liveness, LivenessTracker};
use crate::reconnect::ReconnectPolicy;
use crate::transport::{Outbound, Transport, TransportSession};

/// How long `disconnect` waits for the transport to flush its close.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Connection parameters for a `NotificationClient`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server URL (http, https, ws or wss).
    pub endpoint: String,
    pub auth: AuthPayload,
    pub reconnect: ReconnectPolicy,
    /// Automatic ping period inside `wait`; None disables it.
    pub ping_interval: Option<Duration>,
    /// How long a ping may go unanswered before liveness turns stale.
    pub pong_timeout: Duration,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>, auth: AuthPayload) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth,
            reconnect: ReconnectPolicy::default(),
            ping_interval: None,
            pong_timeout: Duration::from_secs(nc_core::constants::DEFAULT_PONG_TIMEOUT_SECS),
        }
    }

    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            endpoint: config.server.url.clone(),
            auth: AuthPayload::from(&config.auth),
            reconnect: ReconnectPolicy::from(&config.reconnect),
            ping_interval: config.health.ping_interval(),
            pong_timeout: config.health.pong_timeout(),
        }
    }

    /// Set a custom reconnection policy.
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Enable automatic pings while waiting for events.
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = Some(interval);
        self
    }
}

/// How `wait` ended without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shutdown {
    /// The shutdown future resolved; the client unsubscribed and disconnected.
    Interrupted,
    /// The server closed the session.
    ServerClosed,
    /// The server rejected the credentials after the session opened.
    AuthRejected(String),
}

type Handler<T> = Box<dyn FnMut(&T) + Send>;

#[derive(Default)]
struct Handlers {
    connected: Vec<Handler<Connection>>,
    disconnected: Vec<Handler<DisconnectReason>>,
    notification: Vec<Handler<NotificationEvent>>,
    pong: Vec<Handler<Value>>,
    auth_failed: Vec<Handler<String>>,
    server_shutdown: Vec<Handler<Value>>,
    error: Vec<Handler<NcError>>,
}

fn dispatch<T>(handlers: &mut [Handler<T>], value: &T) {
    for handler in handlers.iter_mut() {
        handler(value);
    }
}

struct ActiveSession {
    connection: Connection,
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::UnboundedReceiver<InboundEvent>,
}

/// Publish/subscribe client for a notification server.
pub struct NotificationClient<T: Transport> {
    config: ClientConfig,
    transport: T,
    state_tx: watch::Sender<ConnectionState>,
    session: Option<ActiveSession>,
    room: Option<String>,
    liveness: LivenessTracker,
    handlers: Handlers,
}

impl<T: Transport> NotificationClient<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let liveness = LivenessTracker::new(config.pong_timeout);
        Self {
            config,
            transport,
            state_tx,
            session: None,
            room: None,
            liveness,
            handlers: Handlers::default(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// The live connection, if any.
    pub fn connection(&self) -> Option<&Connection> {
        self.session.as_ref().map(|s| &s.connection)
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// The room currently joined, if any.
    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    /// Soft liveness signal from the ping/pong history.
    pub fn liveness(&self) -> Liveness {
        self.liveness.status()
    }

    /// Wall-clock time of the last pong.
    pub fn last_pong_at(&self) -> Option<DateTime<Utc>> {
        self.liveness.last_pong_at()
    }

    /// Round trip of the last answered ping.
    pub fn last_round_trip(&self) -> Option<Duration> {
        self.liveness.last_round_trip()
    }

    // -- Handler registration --

    /// Called after every successful connect, including reconnects.
    pub fn on_connected(&mut self, handler: impl FnMut(&Connection) + Send + 'static) {
        self.handlers.connected.push(Box::new(handler));
    }

    /// Called whenever a live session ends.
    pub fn on_disconnected(&mut self, handler: impl FnMut(&DisconnectReason) + Send + 'static) {
        self.handlers.disconnected.push(Box::new(handler));
    }

    /// Called once per inbound notification, in arrival order.
    pub fn on_notification(&mut self, handler: impl FnMut(&NotificationEvent) + Send + 'static) {
        self.handlers.notification.push(Box::new(handler));
    }

    pub fn on_pong(&mut self, handler: impl FnMut(&Value) + Send + 'static) {
        self.handlers.pong.push(Box::new(handler));
    }

    /// Called once when the server rejects the credentials.
    pub fn on_auth_failed(&mut self, mut handler: impl FnMut(&str) + Send + 'static) {
        self.handlers
            .auth_failed
            .push(Box::new(move |message: &String| handler(message)));
    }

    pub fn on_server_shutdown(&mut self, handler: impl FnMut(&Value) + Send + 'static) {
        self.handlers.server_shutdown.push(Box::new(handler));
    }

    /// Called for each failed connection attempt and other non-fatal errors.
    pub fn on_error(&mut self, handler: impl FnMut(&NcError) + Send + 'static) {
        self.handlers.error.push(Box::new(handler));
    }

    // -- Lifecycle --

    fn set_state(&self, new_state: ConnectionState) {
        self.state_tx.send_if_modified(|state| {
            if *state == new_state {
                return false;
            }
            info!("client state: {} -> {}", *state, new_state);
            *state = new_state;
            true
        });
    }

    fn report_error(&mut self, e: &NcError) {
        dispatch(&mut self.handlers.error, e);
    }

    /// Connect and authenticate.
    ///
    /// Transient failures are retried per the reconnect policy; an
    /// authentication rejection is reported once and never retried.
    /// Returns the existing connection when already connected.
    pub async fn connect(&mut self) -> NcResult<Connection> {
        if let Some(session) = &self.session {
            debug!("already connected (sid {}), skipping", session.connection.sid);
            return Ok(session.connection.clone());
        }

        let endpoint = AppConfig::parse_server_url(&self.config.endpoint)?;
        if self.config.auth.email.trim().is_empty() {
            return Err(NcError::MissingConfig("user email".into()));
        }

        info!("connecting to {endpoint} as {}", self.config.auth.email);
        self.set_state(ConnectionState::Connecting);
        self.establish(&endpoint).await
    }

    async fn establish(&mut self, endpoint: &Url) -> NcResult<Connection> {
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let err = match self.transport.open(endpoint, &self.config.auth).await {
                Ok(session) => return Ok(self.activate(session)),
                Err(e) => e,
            };

            match err {
                NcError::AuthFailed(message) => {
                    warn!("authentication failed: {message}");
                    self.set_state(ConnectionState::AuthFailed);
                    dispatch(&mut self.handlers.auth_failed, &message);
                    return Err(NcError::AuthFailed(message));
                }
                e if e.is_transient() => {
                    self.report_error(&e);
                    if !self.config.reconnect.allows_retry(attempts) {
                        error!("giving up after {attempts} connection attempt(s): {e}");
                        self.set_state(ConnectionState::Failed);
                        return Err(NcError::RetriesExhausted {
                            attempts,
                            last_error: e.to_string(),
                        });
                    }
                    let delay = self.config.reconnect.delay(attempts - 1);
                    warn!(
                        "connection attempt {attempts} failed: {e}; retrying in {:.1}s",
                        delay.as_secs_f64()
                    );
                    sleep(delay).await;
                }
                e => {
                    error!("connection failed: {e}");
                    self.report_error(&e);
                    self.set_state(ConnectionState::Disconnected);
                    return Err(e);
                }
            }
        }
    }

    fn activate(&mut self, session: TransportSession) -> Connection {
        let connection = Connection {
            sid: session.sid,
            connected: true,
            auth: self.config.auth.clone(),
            transport: session.kind,
            connected_at: Utc::now(),
        };
        info!("connected with sid {} over {}", connection.sid, connection.transport);

        self.session = Some(ActiveSession {
            connection: connection.clone(),
            outbound: session.outbound,
            inbound: session.inbound,
        });
        self.liveness.reset();
        self.set_state(ConnectionState::Connected);
        dispatch(&mut self.handlers.connected, &connection);
        connection
    }

    fn emit(&self, event: &str, data: Option<Value>) -> NcResult<()> {
        let session = self.session.as_ref().ok_or(NcError::NotConnected)?;
        session
            .outbound
            .send(Outbound::Emit {
                event: event.to_string(),
                data,
            })
            .map_err(|_| NcError::Connection("session is closed".into()))
    }

    /// Join `room`. Fire-and-forget; leaves any previously joined room first.
    pub fn subscribe(&mut self, room: &str) -> NcResult<()> {
        if !self.is_connected() {
            return Err(NcError::NotConnected);
        }
        if let Some(current) = self.room.clone() {
            if current == room {
                debug!("already subscribed to {room}");
                return Ok(());
            }
            self.unsubscribe(&current)?;
        }

        self.emit(events::SUBSCRIBE, Some(Value::String(room.to_string())))?;
        info!("subscribed to room {room}");
        self.room = Some(room.to_string());
        Ok(())
    }

    /// Leave `room`. Membership is cleared locally even if the emit fails.
    pub fn unsubscribe(&mut self, room: &str) -> NcResult<()> {
        let sent = self.emit(events::UNSUBSCRIBE, Some(Value::String(room.to_string())));
        if self.room.as_deref() == Some(room) {
            self.room = None;
        }
        sent?;
        info!("unsubscribed from room {room}");
        Ok(())
    }

    /// Send a liveness probe. A missing pong never closes the connection.
    pub fn ping(&mut self) -> NcResult<()> {
        self.emit(events::PING, None)?;
        self.liveness.record_ping(Instant::now());
        debug!("ping sent");
        Ok(())
    }

    async fn close_session(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if session.outbound.send(Outbound::Close(ack_tx)).is_ok()
            && tokio::time::timeout(DISCONNECT_TIMEOUT, ack_rx).await.is_err()
        {
            warn!("transport did not confirm close within {DISCONNECT_TIMEOUT:?}");
        }
        true
    }

    /// Close the connection. Calling it while disconnected is a no-op.
    pub async fn disconnect(&mut self) {
        if !self.close_session().await {
            debug!("disconnect requested while not connected");
            return;
        }
        self.room = None;
        self.set_state(ConnectionState::Disconnected);
        info!("disconnected from {}", self.config.endpoint);
        dispatch(&mut self.handlers.disconnected, &DisconnectReason::ClientRequested);
    }

    /// Unsubscribe from the current room, then disconnect.
    ///
    /// The disconnect happens even when the unsubscribe fails; that failure
    /// is returned afterwards.
    pub async fn shutdown(&mut self) -> NcResult<()> {
        let unsubscribed = match self.room.clone() {
            Some(room) => self.unsubscribe(&room),
            None => Ok(()),
        };
        if let Err(e) = &unsubscribed {
            warn!("unsubscribe during shutdown failed: {e}");
        }
        self.disconnect().await;
        unsubscribed
    }

    /// Dispatch events until `shutdown` resolves or the session ends.
    ///
    /// Dropped connections are re-established with the reconnect policy
    /// and the previous room is re-joined. Returns an error only when
    /// reconnection is exhausted or disabled.
    pub async fn wait<F>(&mut self, shutdown: F) -> NcResult<Shutdown>
    where
        F: Future<Output = ()>,
    {
        if self.session.is_none() {
            return Err(NcError::NotConnected);
        }

        tokio::pin!(shutdown);
        let mut health = self.config.ping_interval.map(|period| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            let step = tokio::select! {
                event = next_inbound(&mut self.session) => Step::Inbound(event),
                _ = next_tick(&mut health) => Step::HealthTick,
                _ = &mut shutdown => Step::Interrupt,
            };

            match step {
                Step::Interrupt => {
                    info!("interrupted, shutting down");
                    if let Err(e) = self.shutdown().await {
                        self.report_error(&e);
                    }
                    return Ok(Shutdown::Interrupted);
                }
                Step::HealthTick => self.health_probe(),
                Step::Inbound(event) => {
                    if let Some(outcome) = self.handle_inbound(event, &mut shutdown).await? {
                        return Ok(outcome);
                    }
                }
            }
        }
    }

    async fn handle_inbound<F>(
        &mut self,
        event: InboundEvent,
        shutdown: &mut Pin<&mut F>,
    ) -> NcResult<Option<Shutdown>>
    where
        F: Future<Output = ()>,
    {
        match event {
            InboundEvent::Notification(notification) => {
                debug!("notification: {}", notification.kind);
                dispatch(&mut self.handlers.notification, &notification);
            }
            InboundEvent::Pong(data) => {
                self.liveness.record_pong(Instant::now());
                debug!("pong received");
                dispatch(&mut self.handlers.pong, &data);
            }
            InboundEvent::ServerShutdown(data) => {
                warn!("server is shutting down: {data}");
                dispatch(&mut self.handlers.server_shutdown, &data);
            }
            InboundEvent::Other { name, .. } => debug!("unhandled event {name}"),
            InboundEvent::AuthError(message) => {
                warn!("authentication failed: {message}");
                self.close_session().await;
                self.room = None;
                self.set_state(ConnectionState::AuthFailed);
                dispatch(&mut self.handlers.auth_failed, &message);
                dispatch(&mut self.handlers.disconnected, &DisconnectReason::AuthRejected);
                return Ok(Some(Shutdown::AuthRejected(message)));
            }
            InboundEvent::ServerDisconnect => {
                info!("server closed the session");
                self.session = None;
                self.room = None;
                self.set_state(ConnectionState::Disconnected);
                dispatch(&mut self.handlers.disconnected, &DisconnectReason::ServerClosed);
                return Ok(Some(Shutdown::ServerClosed));
            }
            InboundEvent::TransportClosed(reason) => return self.recover(reason, shutdown).await,
        }
        Ok(None)
    }

    async fn recover<F>(
        &mut self,
        reason: String,
        shutdown: &mut Pin<&mut F>,
    ) -> NcResult<Option<Shutdown>>
    where
        F: Future<Output = ()>,
    {
        warn!("connection lost: {reason}");
        self.session = None;
        dispatch(
            &mut self.handlers.disconnected,
            &DisconnectReason::TransportLost(reason.clone()),
        );

        if !self.config.reconnect.enabled {
            self.room = None;
            self.set_state(ConnectionState::Disconnected);
            return Err(NcError::Connection(format!("connection lost: {reason}")));
        }

        self.set_state(ConnectionState::Reconnecting);
        let endpoint = AppConfig::parse_server_url(&self.config.endpoint)?;
        let delay = self.config.reconnect.delay(0);
        info!("reconnecting in {:.1}s", delay.as_secs_f64());

        let result = tokio::select! {
            result = async {
                sleep(delay).await;
                self.establish(&endpoint).await
            } => result,
            _ = shutdown.as_mut() => {
                info!("interrupted while reconnecting");
                self.room = None;
                self.set_state(ConnectionState::Disconnected);
                return Ok(Some(Shutdown::Interrupted));
            }
        };

        match result {
            Ok(_) => {
                if let Some(room) = self.room.clone() {
                    match self.emit(events::SUBSCRIBE, Some(Value::String(room.clone()))) {
                        Ok(()) => info!("re-joined room {room}"),
                        Err(e) => {
                            warn!("failed to re-join room {room}: {e}");
                            self.room = None;
                            self.report_error(&e);
                        }
                    }
                }
                Ok(None)
            }
            Err(NcError::AuthFailed(message)) => {
                self.room = None;
                Ok(Some(Shutdown::AuthRejected(message)))
            }
            Err(e) => {
                self.room = None;
                Err(e)
            }
        }
    }

    fn health_probe(&mut self) {
        if self.liveness.status() == Liveness::Stale {
            warn!(
                "no pong within {:?} ({} missed); connection may be unhealthy",
                self.config.pong_timeout,
                self.liveness.missed_pongs()
            );
        }
        if let Err(e) = self.ping() {
            warn!("health ping failed: {e}");
        }
    }
}

enum Step {
    Inbound(InboundEvent),
    HealthTick,
    Interrupt,
}

async fn next_inbound(session: &mut Option<ActiveSession>) -> InboundEvent {
    match session {
        Some(session) => session
            .inbound
            .recv()
            .await
            .unwrap_or_else(|| InboundEvent::TransportClosed("session channel closed".into())),
        None => std::future::pending().await,
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
