//! catsync CLI - Command-line interface for catalog synchronization
//!
//! Provides commands for:
//! - Writing a file of catalog objects to a tenant's catalog
//! - Viewing, editing and validating configuration

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use catsync_core::config::{Config, LoggingConfig};

mod commands;
mod output;

use commands::{config::ConfigCommand, sync::SyncCommand};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "catsync",
    version,
    about = "Version-safe batch synchronization for remote catalogs"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write catalog objects from a JSON file
    Sync(SyncCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Loads the configuration `command` runs with
///
/// `sync` writes to the configured service, so an existing file that fails
/// to parse or validate is an error there. The `config` commands fall back
/// to defaults so a broken file can still be inspected and repaired.
fn load_config(command: &Commands, path: &Path) -> Result<Config> {
    match command {
        Commands::Sync(_) => Config::load_validated(path),
        Commands::Config(_) => Ok(Config::load_or_default(path)),
    }
}

/// Installs the global tracing subscriber
///
/// `RUST_LOG` wins over everything; otherwise `-v` flags raise the level
/// configured in `logging.level`. Logs go to stderr so JSON command output
/// on stdout stays parseable.
fn init_tracing(logging: &LoggingConfig, verbose: u8) {
    let level = match verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = load_config(&cli.command, &config_path)?;

    init_tracing(&config.logging, cli.verbose);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Sync(cmd) => cmd.execute(format, &config).await,
        Commands::Config(cmd) => cmd.execute(format, &config_path).await,
    }
}
