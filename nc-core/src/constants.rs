//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "NotifyClient";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default notification server URL.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3001";

/// Default identification email when none is configured.
pub const DEFAULT_USER_EMAIL: &str = "rust-client@example.com";

/// Default Socket.IO endpoint path.
pub const DEFAULT_SOCKET_PATH: &str = "/socket.io/";

/// Default Socket.IO namespace.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Default handshake timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 20_000;

/// Default number of connection attempts before giving up.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;

/// Default base reconnect delay in milliseconds.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;

/// Default reconnect delay cap in milliseconds.
pub const DEFAULT_RECONNECT_DELAY_MAX_MS: u64 = 5_000;

/// Default pong timeout in seconds.
pub const DEFAULT_PONG_TIMEOUT_SECS: u64 = 10;

/// Environment variables read by `AppConfig::apply_env`.
pub mod env {
    /// Server URL override.
    pub const SOCKET_URL: &str = "SOCKET_URL";
    /// API key override.
    pub const API_KEY: &str = "WEBSOCKET_API_KEY";
    /// User email override.
    pub const USER_EMAIL: &str = "USER_EMAIL";
}

/// Wire-level event names.
pub mod events {
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const NOTIFICATION: &str = "notification";
    pub const AUTH_ERROR: &str = "auth:error";
    pub const SERVER_SHUTDOWN: &str = "server:shutdown";
}
