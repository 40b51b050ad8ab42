//! Notify Client CLI - receive room notifications from a Socket.IO server.
//!
//! Connects with an email/API-key auth payload, optionally joins a room, and
//! prints every notification until interrupted. Useful for headless
//! monitoring, scripting, and debugging a notification server.

mod commands;
mod sink;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use tracing::info;

use nc_core::config::AppConfig;
use nc_core::error::{NcError, NcResult};
use nc_core::logging;

/// Notify Client - Socket.IO notification listener.
#[derive(Parser)]
#[command(
    name = "notify-client",
    version,
    about = "Socket.IO notification client",
    long_about = "A command-line client for a Socket.IO notification server.\n\
                   Authenticates with an email and API key, joins a room, and prints notifications."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print notifications until Ctrl+C.
    Listen {
        /// Server URL (overrides SOCKET_URL and config).
        #[arg(short, long)]
        url: Option<String>,
        /// API key (overrides WEBSOCKET_API_KEY and config).
        #[arg(short = 'k', long)]
        api_key: Option<String>,
        /// User email sent in the auth payload (overrides USER_EMAIL and config).
        #[arg(short, long)]
        email: Option<String>,
        /// Room to join after connecting.
        #[arg(short, long)]
        room: Option<String>,
        /// Send a health ping every N seconds (0 disables).
        #[arg(long, value_name = "SECS")]
        ping: Option<u64>,
    },
    /// Connect, send one ping, and report the pong latency.
    Ping {
        /// Seconds to wait for the pong.
        #[arg(short, long, default_value = "10")]
        timeout_secs: u64,
    },
    /// Inspect or create the configuration file.
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// Load the config file (explicit path, else the default location), then the environment.
fn load_config(path: Option<&Path>) -> NcResult<AppConfig> {
    let mut config = match path {
        Some(path) if path.exists() => AppConfig::load_from_file(path)?,
        Some(path) => {
            return Err(NcError::Config(format!(
                "config file {} not found",
                path.display()
            )));
        }
        None => AppConfig::load_default()?,
    };
    config.apply_env();
    Ok(config)
}

async fn run(cli: Cli) -> NcResult<()> {
    // `config init` must work before any config file exists.
    if let Commands::Config { action } = cli.command {
        logging::init_console_logging("warn");
        let config = match action {
            commands::config::ConfigAction::Init { .. } => AppConfig::default(),
            _ => load_config(cli.config.as_deref())?,
        };
        return commands::config::run(&config, action, cli.config);
    }

    let mut config = load_config(cli.config.as_deref())?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    let log_dir = config
        .effective_log_dir()
        .unwrap_or_else(|_| PathBuf::from("logs"));
    let _guard = logging::init_logging(
        &config.logging.level,
        &log_dir,
        config.logging.json_output,
    )?;

    info!("Notify Client v{}", nc_core::constants::APP_VERSION);

    match cli.command {
        Commands::Listen {
            url,
            api_key,
            email,
            room,
            ping,
        } => {
            let args = commands::listen::ListenArgs {
                url,
                api_key,
                email,
                room,
                ping_secs: ping,
            };
            commands::listen::run(config, args).await
        }
        Commands::Ping { timeout_secs } => {
            commands::ping::run(config, Duration::from_secs(timeout_secs)).await
        }
        // Handled before logging is set up.
        Commands::Config { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", style("error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_listen_flags_parse() {
        let cli = Cli::try_parse_from([
            "notify-client",
            "--verbose",
            "listen",
            "--url",
            "http://localhost:3001",
            "-k",
            "valid-key",
            "--room",
            "room-A",
            "--ping",
            "30",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Listen { api_key, room, ping, .. } => {
                assert_eq!(api_key.as_deref(), Some("valid-key"));
                assert_eq!(room.as_deref(), Some("room-A"));
                assert_eq!(ping, Some(30));
            }
            _ => panic!("expected listen"),
        }
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            load_config(Some(&missing)),
            Err(NcError::Config(_))
        ));
    }
}
