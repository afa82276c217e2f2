//! Configuration module for catsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//!
//! Every section is optional in the file; missing sections and fields fall
//! back to their defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for catsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub retry: RetryConfig,
    pub optimizer: OptimizerSettings,
    pub reconcile: ReconcileConfig,
    pub logging: LoggingConfig,
}

/// Remote catalog service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the catalog API, without a trailing path.
    pub base_url: String,
    /// API version sent with every request.
    pub api_version: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

/// Adaptive retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per batch, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Growth factor applied per attempt.
    pub backoff_multiplier: f64,
    /// Random spread applied to each delay, as a fraction (0.0 - 1.0).
    pub jitter: f64,
    /// Upper bound for a single backoff sleep, in milliseconds.
    pub max_delay_ms: u64,
}

/// Throughput optimizer thresholds and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    pub min_batch_size: usize,
    /// Batch size used with no (or an unremarkable) performance history.
    pub default_batch_size: usize,
    pub max_batch_size: usize,
    pub default_concurrency: usize,
    pub max_concurrency: usize,
    /// Inter-batch delay on cold start, in milliseconds.
    pub default_delay_ms: u64,
    /// Floor the delay shrinks toward for healthy tenants, in milliseconds.
    pub min_delay_ms: u64,
    /// Minimum delay while degraded, in milliseconds.
    pub degraded_delay_ms: u64,
    /// Success rate at or above which a tenant is healthy.
    pub healthy_success_rate: f64,
    /// Success rate below which a tenant is degraded.
    pub degraded_success_rate: f64,
    /// How far back a rate-limit error forces the degraded tier, in seconds.
    pub rate_limit_lookback_secs: u64,
    /// How long error records are kept, in seconds.
    pub error_retention_secs: u64,
    /// Maximum number of error records kept per tenant.
    pub max_recent_errors: usize,
    /// Number of most recent write outcomes the success rate is computed over.
    pub outcome_window: usize,
    /// Requests needed before a healthy profile scales to full size.
    pub warmup_requests: u64,
    /// Latency above which healthy scaling is dampened, in milliseconds.
    pub target_latency_ms: u64,
    /// Weight of the newest sample in the rolling latency average (0.0 - 1.0).
    pub latency_smoothing: f64,
}

/// Reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Merge strategy: `local_wins`, `remote_wins`, or `newer_wins`.
    pub strategy: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Load configuration for a command that writes to the service.
    ///
    /// A missing file yields the defaults. A file that exists must parse and
    /// pass [`Config::validate`]; nothing falls back silently.
    pub fn load_validated(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let config = Self::load(path)?;
        let errors = config.validate();
        if !errors.is_empty() {
            let details: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            anyhow::bail!(
                "Invalid config file {}: {}",
                path.display(),
                details.join("; ")
            );
        }
        Ok(config)
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/catsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("catsync")
            .join("config.yaml")
    }

    /// Serialize the configuration back to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://connect.squareup.com".to_string(),
            api_version: "2024-01-18".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            jitter: 0.2,
            max_delay_ms: 60_000,
        }
    }
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            min_batch_size: 10,
            default_batch_size: 100,
            max_batch_size: 1_000,
            default_concurrency: 1,
            max_concurrency: 4,
            default_delay_ms: 500,
            min_delay_ms: 100,
            degraded_delay_ms: 5_000,
            healthy_success_rate: 0.95,
            degraded_success_rate: 0.8,
            rate_limit_lookback_secs: 60,
            error_retention_secs: 300,
            max_recent_errors: 50,
            outcome_window: 100,
            warmup_requests: 20,
            target_latency_ms: 2_000,
            latency_smoothing: 0.2,
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            strategy: "local_wins".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"retry.max_attempts"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `reconcile.strategy`.
pub const VALID_MERGE_STRATEGIES: &[&str] = &["local_wins", "remote_wins", "newer_wins"];

fn push(errors: &mut Vec<ValidationError>, field: &str, message: impl Into<String>) {
    errors.push(ValidationError {
        field: field.into(),
        message: message.into(),
    });
}

fn is_fraction(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- service ---
        let url = &self.service.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            push(&mut errors, "service.base_url", "must start with http:// or https://");
        }
        if self.service.request_timeout_secs == 0 {
            push(&mut errors, "service.request_timeout_secs", "must be greater than 0");
        }

        // --- retry ---
        let retry = &self.retry;
        if retry.max_attempts == 0 {
            push(&mut errors, "retry.max_attempts", "must be greater than 0");
        }
        if retry.backoff_multiplier < 1.0 {
            push(&mut errors, "retry.backoff_multiplier", "must be at least 1.0");
        }
        if !is_fraction(retry.jitter) {
            push(&mut errors, "retry.jitter", "must be between 0.0 and 1.0");
        }
        if retry.max_delay_ms < retry.base_delay_ms {
            push(
                &mut errors,
                "retry.max_delay_ms",
                format!(
                    "must be at least base_delay_ms ({} ms)",
                    retry.base_delay_ms
                ),
            );
        }

        // --- optimizer ---
        let opt = &self.optimizer;
        if opt.min_batch_size == 0 {
            push(&mut errors, "optimizer.min_batch_size", "must be greater than 0");
        }
        if opt.default_batch_size < opt.min_batch_size || opt.default_batch_size > opt.max_batch_size
        {
            push(
                &mut errors,
                "optimizer.default_batch_size",
                format!(
                    "must be between min_batch_size ({}) and max_batch_size ({})",
                    opt.min_batch_size, opt.max_batch_size
                ),
            );
        }
        if opt.default_concurrency == 0 {
            push(&mut errors, "optimizer.default_concurrency", "must be greater than 0");
        }
        if opt.max_concurrency < opt.default_concurrency {
            push(
                &mut errors,
                "optimizer.max_concurrency",
                format!(
                    "must be at least default_concurrency ({})",
                    opt.default_concurrency
                ),
            );
        }
        if opt.min_delay_ms > opt.default_delay_ms {
            push(
                &mut errors,
                "optimizer.min_delay_ms",
                format!("must not exceed default_delay_ms ({} ms)", opt.default_delay_ms),
            );
        }
        if !is_fraction(opt.healthy_success_rate) {
            push(&mut errors, "optimizer.healthy_success_rate", "must be between 0.0 and 1.0");
        }
        if !is_fraction(opt.degraded_success_rate) {
            push(&mut errors, "optimizer.degraded_success_rate", "must be between 0.0 and 1.0");
        }
        if opt.degraded_success_rate > opt.healthy_success_rate {
            push(
                &mut errors,
                "optimizer.degraded_success_rate",
                "must not exceed healthy_success_rate",
            );
        }
        if opt.max_recent_errors == 0 {
            push(&mut errors, "optimizer.max_recent_errors", "must be greater than 0");
        }
        if opt.outcome_window == 0 {
            push(&mut errors, "optimizer.outcome_window", "must be greater than 0");
        }
        if opt.warmup_requests == 0 {
            push(&mut errors, "optimizer.warmup_requests", "must be greater than 0");
        } else if opt.warmup_requests > opt.outcome_window as u64 {
            push(
                &mut errors,
                "optimizer.warmup_requests",
                "must not exceed outcome_window",
            );
        }
        if opt.target_latency_ms == 0 {
            push(&mut errors, "optimizer.target_latency_ms", "must be greater than 0");
        }
        if opt.latency_smoothing <= 0.0 || opt.latency_smoothing > 1.0 {
            push(&mut errors, "optimizer.latency_smoothing", "must be in (0.0, 1.0]");
        }

        // --- reconcile ---
        if !VALID_MERGE_STRATEGIES.contains(&self.reconcile.strategy.as_str()) {
            push(
                &mut errors,
                "reconcile.strategy",
                format!(
                    "invalid strategy '{}', expected one of: {}",
                    self.reconcile.strategy,
                    VALID_MERGE_STRATEGIES.join(", ")
                ),
            );
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                &mut errors,
                "logging.level",
                format!(
                    "invalid level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Config`], starting from defaults.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a builder pre-populated with [`Config::default`].
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- service ---

    pub fn service_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.service.base_url = url.into();
        self
    }

    pub fn service_request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.service.request_timeout_secs = seconds;
        self
    }

    // --- retry ---

    pub fn retry_max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_delay_ms = ms;
        self
    }

    pub fn retry_jitter(mut self, jitter: f64) -> Self {
        self.config.retry.jitter = jitter;
        self
    }

    // --- optimizer ---

    pub fn optimizer_batch_sizes(mut self, min: usize, default: usize, max: usize) -> Self {
        self.config.optimizer.min_batch_size = min;
        self.config.optimizer.default_batch_size = default;
        self.config.optimizer.max_batch_size = max;
        self
    }

    pub fn optimizer_max_concurrency(mut self, n: usize) -> Self {
        self.config.optimizer.max_concurrency = n;
        self
    }

    pub fn optimizer_success_rates(mut self, healthy: f64, degraded: f64) -> Self {
        self.config.optimizer.healthy_success_rate = healthy;
        self.config.optimizer.degraded_success_rate = degraded;
        self
    }

    // --- reconcile ---

    pub fn reconcile_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.config.reconcile.strategy = strategy.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
