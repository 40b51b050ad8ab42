//! Notify Socket - Socket.IO client for room-based notification delivery.
//!
//! This crate provides the notification client that handles:
//! - Engine.IO v4 / Socket.IO v5 framing over websocket or long-polling
//! - Authentication in the namespace connect payload
//! - Automatic reconnection with exponential backoff and jitter
//! - Room subscription that survives reconnects
//! - Ping/pong liveness tracking

pub mod client;
pub mod events;
pub mod health;
pub mod protocol;
pub mod reconnect;
pub mod transport;

// Re-export key types
pub use client::{ClientConfig, NotificationClient, Shutdown};
pub use events::{
    AuthPayload, Connection, ConnectionState, DisconnectReason, InboundEvent, NotificationEvent,
    TransportKind,
};
pub use health::Liveness;
pub use reconnect::ReconnectPolicy;
pub use transport::{SocketIoTransport, Transport, TransportSession, TransportSettings};
