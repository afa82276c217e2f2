//! Config command - View and manage catsync configuration
//!
//! Provides the `catsync config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Sets individual values via dot-notation keys
//! 3. Validates the configuration file and reports errors
//! 4. Prints the configuration file path

use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tracing::info;

use catsync_core::config::Config;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "retry.max_attempts")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

/// Keys accepted by `config set`
const SETTABLE_KEYS: &[&str] = &[
    "service.base_url",
    "service.api_version",
    "service.request_timeout_secs",
    "retry.max_attempts",
    "retry.base_delay_ms",
    "retry.backoff_multiplier",
    "retry.jitter",
    "retry.max_delay_ms",
    "optimizer.min_batch_size",
    "optimizer.default_batch_size",
    "optimizer.max_batch_size",
    "optimizer.default_concurrency",
    "optimizer.max_concurrency",
    "optimizer.default_delay_ms",
    "optimizer.healthy_success_rate",
    "optimizer.degraded_success_rate",
    "optimizer.outcome_window",
    "reconcile.strategy",
    "logging.level",
    "logging.json",
];

impl ConfigCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(format, config_path),
            ConfigCommand::Set { key, value } => self.execute_set(key, value, format, config_path),
            ConfigCommand::Validate => self.execute_validate(format, config_path),
            ConfigCommand::Path => {
                let formatter = get_formatter(format);
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "config_path": config_path.display().to_string(),
                        "exists": config_path.exists(),
                    }));
                } else {
                    println!("{}", config_path.display());
                }
                Ok(())
            }
        }
    }

    fn execute_show(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);
        let config = Config::load_or_default(config_path);

        info!(config_path = %config_path.display(), "Showing configuration");

        if format.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", config_path.display()));
            formatter.info("");
            for line in config.to_yaml()?.lines() {
                formatter.info(line);
            }
        }
        Ok(())
    }

    fn execute_set(
        &self,
        key: &str,
        value: &str,
        format: OutputFormat,
        config_path: &Path,
    ) -> Result<()> {
        let formatter = get_formatter(format);
        let mut config = Config::load_or_default(config_path);

        info!(key = %key, value = %value, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "error": e.to_string(),
                }));
            } else {
                formatter.error(&format!("Failed to set '{}': {}", key, e));
                formatter.info("Supported keys:");
                for key in SETTABLE_KEYS {
                    formatter.info(&format!("  {}", key));
                }
            }
            return Ok(());
        }

        let errors: Vec<String> = config.validate().iter().map(|e| e.to_string()).collect();
        if !errors.is_empty() {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "errors": errors,
                }));
            } else {
                formatter.error(&format!("Invalid value for '{}': {}", key, errors.join("; ")));
            }
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
        }
        std::fs::write(config_path, config.to_yaml()?)
            .context("Failed to write configuration file")?;

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "value": value,
                "config_path": config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Set {} = {}", key, value));
            formatter.info(&format!("Saved to {}", config_path.display()));
        }
        Ok(())
    }

    fn execute_validate(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);

        if !config_path.exists() {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": true,
                    "config_path": config_path.display().to_string(),
                    "errors": [],
                    "using_defaults": true,
                }));
            } else {
                formatter.info(&format!(
                    "Configuration file not found at {}",
                    config_path.display()
                ));
                formatter.info("Using default configuration. Run 'catsync config set <key> <value>' to create one.");
            }
            return Ok(());
        }

        let config = match Config::load(config_path) {
            Ok(config) => config,
            Err(e) => {
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": [format!("{:#}", e)],
                    }));
                } else {
                    formatter.error(&format!("{:#}", e));
                }
                bail!("Configuration could not be parsed");
            }
        };

        info!(config_path = %config_path.display(), "Validating configuration");
        let errors = config.validate();

        if format.is_json() {
            let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": config_path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", config_path.display()));
        } else {
            formatter.error(&format!("Configuration has {} error(s)", errors.len()));
            for error in &errors {
                formatter.info(&format!("- {}", error));
            }
        }

        if !errors.is_empty() {
            bail!("Configuration is invalid");
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .ok()
        .with_context(|| format!("Invalid value '{}' for {}", value, key))
}

/// Applies a dot-notation `key = value` to `config`
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- service ---
        "service.base_url" => config.service.base_url = value.to_string(),
        "service.api_version" => config.service.api_version = value.to_string(),
        "service.request_timeout_secs" => {
            config.service.request_timeout_secs = parse_value(key, value)?
        }

        // --- retry ---
        "retry.max_attempts" => config.retry.max_attempts = parse_value(key, value)?,
        "retry.base_delay_ms" => config.retry.base_delay_ms = parse_value(key, value)?,
        "retry.backoff_multiplier" => config.retry.backoff_multiplier = parse_value(key, value)?,
        "retry.jitter" => config.retry.jitter = parse_value(key, value)?,
        "retry.max_delay_ms" => config.retry.max_delay_ms = parse_value(key, value)?,

        // --- optimizer ---
        "optimizer.min_batch_size" => config.optimizer.min_batch_size = parse_value(key, value)?,
        "optimizer.default_batch_size" => {
            config.optimizer.default_batch_size = parse_value(key, value)?
        }
        "optimizer.max_batch_size" => config.optimizer.max_batch_size = parse_value(key, value)?,
        "optimizer.default_concurrency" => {
            config.optimizer.default_concurrency = parse_value(key, value)?
        }
        "optimizer.max_concurrency" => config.optimizer.max_concurrency = parse_value(key, value)?,
        "optimizer.default_delay_ms" => {
            config.optimizer.default_delay_ms = parse_value(key, value)?
        }
        "optimizer.healthy_success_rate" => {
            config.optimizer.healthy_success_rate = parse_value(key, value)?
        }
        "optimizer.degraded_success_rate" => {
            config.optimizer.degraded_success_rate = parse_value(key, value)?
        }
        "optimizer.outcome_window" => config.optimizer.outcome_window = parse_value(key, value)?,

        // --- reconcile / logging ---
        "reconcile.strategy" => config.reconcile.strategy = value.to_string(),
        "logging.level" => config.logging.level = value.to_string(),
        "logging.json" => config.logging.json = parse_value(key, value)?,

        _ => bail!("Unknown configuration key '{}'", key),
    }
    Ok(())
}
