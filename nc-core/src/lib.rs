//! Notification Client Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by the other notification client crates:
//! - Application configuration (server URL, credentials, reconnect and health policy)
//! - The error taxonomy shared by the socket layer and the CLI
//! - Structured logging with tracing
//! - Common constants

pub mod config;
pub mod error;
pub mod logging;
pub mod constants;

// Re-export commonly used items at the crate root
pub use config::AppConfig;
pub use error::{NcError, NcResult};
pub use logging::init_logging;
