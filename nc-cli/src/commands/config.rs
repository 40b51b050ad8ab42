//! Config commands.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use console::style;

use nc_core::config::AppConfig;
use nc_core::error::{NcError, NcResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration (file, then environment).
    Show,
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the configuration file path.
    Path,
}

/// Render the config as TOML with the API key masked.
pub fn render_masked(config: &AppConfig) -> NcResult<String> {
    let mut shown = config.clone();
    shown.auth.api_key = config.auth.masked_api_key();
    toml::to_string_pretty(&shown)
        .map_err(|e| NcError::Config(format!("failed to serialize config: {e}")))
}

/// Write a default config to `path`, refusing to clobber unless `force`.
pub fn init_file(path: &Path, force: bool) -> NcResult<()> {
    if path.exists() && !force {
        return Err(NcError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    AppConfig::default().save_to_file(path)
}

/// Run a config subcommand.
pub fn run(config: &AppConfig, action: ConfigAction, path: Option<PathBuf>) -> NcResult<()> {
    let path = match path {
        Some(p) => p,
        None => AppConfig::default_config_path()?,
    };

    match action {
        ConfigAction::Show => {
            println!("{}", style(format!("# {}", path.display())).dim());
            print!("{}", render_masked(config)?);
        }
        ConfigAction::Init { force } => {
            init_file(&path, force)?;
            println!("{} wrote {}", style("OK").green().bold(), path.display());
        }
        ConfigAction::Path => println!("{}", path.display()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_masks_api_key() {
        let mut config = AppConfig::default();
        config.auth.api_key = "valid-key".into();

        let rendered = render_masked(&config).unwrap();
        assert!(!rendered.contains("valid-key"));
        assert!(rendered.contains("*********"));
        assert!(rendered.contains("http://localhost:3001"));
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        init_file(&path, false).unwrap();
        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.auth.email, "rust-client@example.com");

        assert!(matches!(init_file(&path, false), Err(NcError::Config(_))));
        init_file(&path, true).unwrap();
    }
}
