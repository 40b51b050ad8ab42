//! Global error types for the notification client.
//!
//! Every failure the client can report is a variant of `NcError`. Variants
//! are grouped by how the connection layer treats them: transient network
//! failures are retried by the reconnect policy, while authentication
//! rejections are terminal.

use thiserror::Error;

/// Convenience type alias for Results using NcError.
pub type NcResult<T> = Result<T, NcError>;

/// Unified error type for the notification client.
#[derive(Error, Debug)]
pub enum NcError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// The server endpoint is not a usable URL.
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    // -- Transient network errors --
    /// Connecting to the server failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The handshake or a request did not complete in time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// WebSocket transport failure.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// HTTP long-polling transport failure.
    #[error("http error: {0}")]
    Http(String),

    // -- Terminal errors --
    /// Connection retries were exhausted.
    #[error("gave up after {attempts} connection attempt(s): {last_error}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The error reported by the final attempt.
        last_error: String,
    },

    /// The server rejected the authentication payload.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// An operation needed a live connection.
    #[error("not connected")]
    NotConnected,

    // -- Protocol / data errors --
    /// The server sent something the protocol codec could not understand.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NcError {
    /// Whether the reconnect policy should retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::WebSocket(_) | Self::Http(_)
        )
    }
}

impl From<serde_json::Error> for NcError {
    fn from(e: serde_json::Error) -> Self {
        NcError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for NcError {
    fn from(e: toml::de::Error) -> Self {
        NcError::Config(e.to_string())
    }
}

impl From<url::ParseError> for NcError {
    fn from(e: url::ParseError) -> Self {
        NcError::InvalidUrl(e.to_string())
    }
}
