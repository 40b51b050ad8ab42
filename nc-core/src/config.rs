//! Application configuration management.
//!
//! Configuration is persisted as TOML on disk and layered at startup:
//! file values first, then the process environment (`SOCKET_URL`,
//! `WEBSOCKET_API_KEY`, `USER_EMAIL`), then CLI flags.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants;
use crate::error::{NcError, NcResult};

/// Per-user directory for this application under an OS base directory
/// (`~/.config/NotifyClient`, `%APPDATA%\NotifyClient`, ...).
fn app_dir(base: Option<PathBuf>, kind: &str) -> NcResult<PathBuf> {
    base.map(|dir| dir.join(constants::APP_NAME))
        .ok_or_else(|| NcError::Config(format!("could not determine {kind} directory")))
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Credentials sent in the handshake.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Reconnection policy for transient failures.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Liveness probing.
    #[serde(default)]
    pub health: HealthConfig,

    /// Room subscription.
    #[serde(default)]
    pub subscription: SubscriptionConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Notification server URL (e.g., "http://localhost:3001").
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Socket.IO namespace.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Socket.IO endpoint path.
    #[serde(default = "default_socket_path")]
    pub path: String,

    /// Transports to try, in order: "websocket", "polling".
    #[serde(default = "default_transports")]
    pub transports: Vec<String>,

    /// Handshake timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Extra HTTP headers sent with the handshake.
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,
}

/// Authentication payload configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Email identifying the user to the server.
    #[serde(default = "default_user_email")]
    pub email: String,

    /// API key. Empty means unauthenticated; the server decides whether that is allowed.
    #[serde(default)]
    pub api_key: String,
}

/// Reconnection policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Whether transient failures are retried at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Total connection attempts per connect or reconnect cycle, the first included.
    #[serde(default = "default_reconnect_attempts")]
    pub attempts: u32,

    /// Base delay between attempts in milliseconds.
    #[serde(default = "default_reconnect_delay")]
    pub delay_ms: u64,

    /// Delay cap in milliseconds.
    #[serde(default = "default_reconnect_delay_max")]
    pub delay_max_ms: u64,

    /// Jitter factor (0.0 to 1.0) applied to each delay.
    #[serde(default = "default_jitter")]
    pub jitter_factor: f64,
}

/// Liveness probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Seconds between automatic pings while waiting for events. 0 disables them.
    #[serde(default)]
    pub ping_interval_secs: u64,

    /// Seconds after a ping without a pong before liveness is reported stale.
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,
}

/// Room subscription configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Room joined right after connecting, if any.
    #[serde(default)]
    pub room: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

fn default_server_url() -> String {
    constants::DEFAULT_SERVER_URL.to_string()
}

fn default_namespace() -> String {
    constants::DEFAULT_NAMESPACE.to_string()
}

fn default_socket_path() -> String {
    constants::DEFAULT_SOCKET_PATH.to_string()
}

fn default_transports() -> Vec<String> {
    vec!["websocket".to_string(), "polling".to_string()]
}

fn default_connect_timeout() -> u64 {
    constants::DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_user_email() -> String {
    constants::DEFAULT_USER_EMAIL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_reconnect_attempts() -> u32 {
    constants::DEFAULT_RECONNECT_ATTEMPTS
}

fn default_reconnect_delay() -> u64 {
    constants::DEFAULT_RECONNECT_DELAY_MS
}

fn default_reconnect_delay_max() -> u64 {
    constants::DEFAULT_RECONNECT_DELAY_MAX_MS
}

fn default_jitter() -> f64 {
    0.3
}

fn default_pong_timeout() -> u64 {
    constants::DEFAULT_PONG_TIMEOUT_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            namespace: default_namespace(),
            path: default_socket_path(),
            transports: default_transports(),
            connect_timeout_ms: default_connect_timeout(),
            custom_headers: HashMap::new(),
        }
    }
}

impl ServerConfig {
    /// Handshake timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            email: default_user_email(),
            api_key: String::new(),
        }
    }
}

impl AuthConfig {
    /// Whether an API key is configured.
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// The API key rendered for display: one `*` per character, or "(not set)".
    pub fn masked_api_key(&self) -> String {
        if self.has_api_key() {
            "*".repeat(self.api_key.chars().count())
        } else {
            "(not set)".to_string()
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            attempts: default_reconnect_attempts(),
            delay_ms: default_reconnect_delay(),
            delay_max_ms: default_reconnect_delay_max(),
            jitter_factor: default_jitter(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 0,
            pong_timeout_secs: default_pong_timeout(),
        }
    }
}

impl HealthConfig {
    /// Automatic ping interval, or None when disabled.
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_secs > 0).then(|| Duration::from_secs(self.ping_interval_secs))
    }

    /// Pong timeout as a Duration.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default config file path, falling back to defaults.
    pub fn load_default() -> NcResult<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> NcResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> NcResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| NcError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> NcResult<PathBuf> {
        Ok(app_dir(dirs::config_dir(), "config")?.join("config.toml"))
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> NcResult<PathBuf> {
        if self.logging.directory.is_empty() {
            Ok(app_dir(dirs::data_dir(), "data")?.join("logs"))
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Override values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Override values from an arbitrary variable lookup.
    ///
    /// Unset or blank variables leave the current value untouched.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(constants::env::SOCKET_URL) {
            self.server.url = Self::sanitize_server_url(&url);
        }
        if let Some(key) = get(constants::env::API_KEY) {
            self.auth.api_key = key;
        }
        if let Some(email) = get(constants::env::USER_EMAIL) {
            self.auth.email = email.trim().to_string();
        }
    }

    /// Check that the configuration can be used to connect.
    pub fn validate(&self) -> NcResult<()> {
        Self::parse_server_url(&self.server.url)?;
        if self.auth.email.trim().is_empty() {
            return Err(NcError::MissingConfig("user email".into()));
        }
        if self.server.transports.is_empty() {
            return Err(NcError::Config("at least one transport is required".into()));
        }
        Ok(())
    }

    /// Parse a server URL, accepting only http(s) and ws(s) endpoints with a host.
    pub fn parse_server_url(raw: &str) -> NcResult<Url> {
        if raw.trim().is_empty() {
            return Err(NcError::MissingConfig("server url".into()));
        }
        let url = Url::parse(raw.trim())?;
        match url.scheme() {
            "http" | "https" | "ws" | "wss" => {}
            other => {
                return Err(NcError::InvalidUrl(format!("unsupported scheme '{other}'")));
            }
        }
        if url.host_str().is_none() {
            return Err(NcError::InvalidUrl(format!("'{raw}' has no host")));
        }
        Ok(url)
    }

    /// Sanitize and normalize a server URL.
    ///
    /// Strips surrounding quotes and whitespace, adds `http://` when no
    /// scheme is given, and strips trailing slashes.
    pub fn sanitize_server_url(address: &str) -> String {
        let trimmed = address.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let has_scheme = ["http://", "https://", "ws://", "wss://"]
            .iter()
            .any(|scheme| trimmed.starts_with(scheme));
        let with_scheme = if has_scheme {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };

        with_scheme.trim_end_matches('/').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_dir_joins_app_name() {
        let dir = app_dir(Some(PathBuf::from("/home/u/.config")), "config").unwrap();
        assert_eq!(dir, PathBuf::from("/home/u/.config").join(constants::APP_NAME));
        assert!(matches!(app_dir(None, "config"), Err(NcError::Config(_))));
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.url, "http://localhost:3001");
        assert_eq!(config.server.transports, vec!["websocket", "polling"]);
        assert_eq!(config.reconnect.attempts, 5);
        assert_eq!(config.reconnect.delay_ms, 1_000);
        assert_eq!(config.reconnect.delay_max_ms, 5_000);
        assert_eq!(config.logging.level, "info");
        assert!(config.subscription.room.is_none());
        assert!(config.health.ping_interval().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sanitize_server_url() {
        assert_eq!(
            AppConfig::sanitize_server_url("localhost:3001"),
            "http://localhost:3001"
        );
        assert_eq!(
            AppConfig::sanitize_server_url("https://notify.example.com/"),
            "https://notify.example.com"
        );
        assert_eq!(
            AppConfig::sanitize_server_url("  \"wss://example.com//\"  "),
            "wss://example.com"
        );
        assert_eq!(AppConfig::sanitize_server_url("   "), "");
    }

    #[test]
    fn test_parse_server_url() {
        assert!(AppConfig::parse_server_url("http://localhost:3001").is_ok());
        assert!(AppConfig::parse_server_url("wss://example.com").is_ok());
        assert!(matches!(
            AppConfig::parse_server_url("ftp://example.com"),
            Err(NcError::InvalidUrl(_))
        ));
        assert!(matches!(
            AppConfig::parse_server_url("not a url"),
            Err(NcError::InvalidUrl(_))
        ));
        assert!(matches!(
            AppConfig::parse_server_url(""),
            Err(NcError::MissingConfig(_))
        ));
    }

    #[test]
    fn test_validate_requires_email() {
        let mut config = AppConfig::default();
        config.auth.email = "  ".into();
        assert!(matches!(config.validate(), Err(NcError::MissingConfig(_))));
    }

    #[test]
    fn test_apply_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_env_with(|key| match key {
            "SOCKET_URL" => Some("notify.internal:4000/".into()),
            "WEBSOCKET_API_KEY" => Some("secret".into()),
            "USER_EMAIL" => Some(" u@example.com ".into()),
            _ => None,
        });
        assert_eq!(config.server.url, "http://notify.internal:4000");
        assert_eq!(config.auth.api_key, "secret");
        assert_eq!(config.auth.email, "u@example.com");
    }

    #[test]
    fn test_apply_env_ignores_blank_values() {
        let mut config = AppConfig::default();
        config.auth.api_key = "from-file".into();
        config.apply_env_with(|key| match key {
            "WEBSOCKET_API_KEY" => Some("   ".into()),
            _ => None,
        });
        assert_eq!(config.auth.api_key, "from-file");
        assert_eq!(config.server.url, "http://localhost:3001");
    }

    #[test]
    fn test_masked_api_key() {
        let mut auth = AuthConfig::default();
        assert!(!auth.has_api_key());
        assert_eq!(auth.masked_api_key(), "(not set)");

        auth.api_key = "abcd".into();
        assert_eq!(auth.masked_api_key(), "****");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [auth]
            api_key = "k"

            [subscription]
            room = "ops"
            "#,
        )
        .unwrap();
        assert_eq!(config.auth.api_key, "k");
        assert_eq!(config.auth.email, "rust-client@example.com");
        assert_eq!(config.subscription.room.as_deref(), Some("ops"));
        assert_eq!(config.server.path, "/socket.io/");
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.health.ping_interval_secs = 15;
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.health.ping_interval(), Some(Duration::from_secs(15)));
    }
}
