//! Sync command - Write catalog objects to a tenant's catalog
//!
//! Provides the `catsync sync` CLI command which:
//! 1. Reads catalog objects (catalog API JSON) from a file
//! 2. Builds the HTTP client, reconciler and synchronizer from configuration
//! 3. Runs the synchronization, cancelling cleanly on Ctrl+C
//! 4. Displays the per-object report

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use catsync_client::wire::{decode_objects, WireObject};
use catsync_client::{CatalogClient, ClientConfig};
use catsync_conflict::Reconciler;
use catsync_core::config::Config;
use catsync_core::domain::{validate_unique, CatalogObject, TenantId};
use catsync_sync::{
    derive_batch_config, BatchSynchronizer, ObjectOutcome, OptimizerConfig, RetryPolicy,
    SyncOptions, SyncReport,
};
use catsync_telemetry::SyncMetrics;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Environment variable holding the tenant's access token
const ACCESS_TOKEN_ENV: &str = "CATSYNC_ACCESS_TOKEN";

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// JSON file with catalog objects (an array, or `{"objects": [...]}`)
    pub file: PathBuf,

    /// Tenant (merchant account) to write to
    #[arg(long)]
    pub tenant: String,

    /// Objects per write call (defaults to the optimizer's choice)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Batches in flight (defaults to the optimizer's choice)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Merge strategy for version conflicts (overrides reconcile.strategy)
    #[arg(long)]
    pub strategy: Option<String>,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    pub metrics: bool,

    /// Show the batch plan without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncCommand {
    pub async fn execute(&self, format: OutputFormat, config: &Config) -> Result<()> {
        let formatter = get_formatter(format);

        let objects = load_objects(&self.file).await?;
        validate_unique(&objects).context("Input contains invalid objects")?;
        let tenant = TenantId::new(self.tenant.as_str()).context("Invalid tenant")?;

        let strategy = self
            .strategy
            .as_deref()
            .unwrap_or(config.reconcile.strategy.as_str());
        let reconciler = Reconciler::from_name(strategy)?;
        let optimizer_config = OptimizerConfig::from(&config.optimizer);

        info!(
            file = %self.file.display(),
            tenant = %tenant,
            objects = objects.len(),
            strategy = reconciler.strategy_name(),
            "Loaded objects"
        );

        if self.dry_run {
            self.print_plan(formatter.as_ref(), format, &objects, &optimizer_config);
            return Ok(());
        }

        let token = std::env::var(ACCESS_TOKEN_ENV)
            .with_context(|| format!("{} is not set", ACCESS_TOKEN_ENV))?;
        let client = CatalogClient::new(
            ClientConfig::from_service(&config.service).with_token(tenant.clone(), token),
        )?;
        let metrics = Arc::new(SyncMetrics::new()?);

        let synchronizer = BatchSynchronizer::new(Arc::new(client), optimizer_config)
            .with_reconciler(reconciler)
            .with_metrics(Arc::clone(&metrics));

        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing in-flight batches");
                interrupt.cancel();
            }
        });

        let mut options = SyncOptions::default().with_cancel(cancel);
        options.batch_size = self.batch_size;
        options.concurrency = self.concurrency;

        let policy = RetryPolicy::from(&config.retry);
        let report = synchronizer
            .synchronize_with(objects, &tenant, &policy, options)
            .await
            .context("Synchronization failed")?;

        print_report(formatter.as_ref(), format, &report)?;

        if self.metrics {
            print!("{}", metrics.encode()?);
        }

        if !report.is_success() {
            bail!(
                "{} object(s) failed, {} not attempted",
                report.failed,
                report.not_attempted
            );
        }
        Ok(())
    }

    fn print_plan(
        &self,
        formatter: &dyn OutputFormatter,
        format: OutputFormat,
        objects: &[CatalogObject],
        optimizer_config: &OptimizerConfig,
    ) {
        let planned = derive_batch_config(None, optimizer_config, chrono::Utc::now());
        let batch_size = self.batch_size.unwrap_or(planned.batch_size).max(1);
        let concurrency = self.concurrency.unwrap_or(planned.concurrency);
        let new_objects = objects.iter().filter(|o| o.is_new()).count();
        let batches = objects.len().div_ceil(batch_size);

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "dry_run": true,
                "objects": objects.len(),
                "new_objects": new_objects,
                "existing_objects": objects.len() - new_objects,
                "batch_size": batch_size,
                "concurrency": concurrency,
                "batches": batches,
            }));
            return;
        }

        formatter.info("Dry run mode - no changes will be made");
        formatter.field("Objects", &objects.len().to_string());
        formatter.field("New", &new_objects.to_string());
        formatter.field("Existing", &(objects.len() - new_objects).to_string());
        formatter.field("Batch size", &batch_size.to_string());
        formatter.field("Concurrency", &concurrency.to_string());
        formatter.field("Batches", &batches.to_string());
        formatter.success("Dry run completed (no changes)");
    }
}

/// Reads catalog objects in catalog API JSON
pub async fn load_objects(path: &Path) -> Result<Vec<CatalogObject>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_objects(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn parse_objects(content: &str) -> Result<Vec<CatalogObject>> {
    let value: Value = serde_json::from_str(content)?;
    let list = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => map
            .remove("objects")
            .context("Expected an array or an object with an \"objects\" array")?,
        _ => bail!("Expected an array or an object with an \"objects\" array"),
    };
    let wire: Vec<WireObject> = serde_json::from_value(list)?;
    Ok(decode_objects(wire)?)
}

fn print_report(
    formatter: &dyn OutputFormatter,
    format: OutputFormat,
    report: &SyncReport,
) -> Result<()> {
    if format.is_json() {
        let json = serde_json::to_value(report).context("Failed to serialize report")?;
        formatter.print_json(&json);
        return Ok(());
    }

    if report.is_success() {
        formatter.success(&format!(
            "Synchronized {} object(s) for {}",
            report.succeeded, report.tenant
        ));
    } else if report.cancelled {
        formatter.warn("Synchronization cancelled");
    } else {
        formatter.warn("Synchronization finished with failures");
    }

    formatter.field("Succeeded", &report.succeeded.to_string());
    formatter.field("Failed", &report.failed.to_string());
    formatter.field("Not attempted", &report.not_attempted.to_string());
    formatter.field("Conflicts recovered", &report.conflicts_recovered.to_string());
    formatter.field("Batches", &report.batches.to_string());
    formatter.field("Write attempts", &report.write_attempts.to_string());
    formatter.field("Duration", &format!("{} ms", report.duration_ms));

    for failure in report.failures() {
        if let ObjectOutcome::Failed {
            class,
            attempts,
            message,
        } = &failure.outcome
        {
            formatter.error(&format!(
                "{} ({}, {} attempt(s)): {}",
                failure.requested_id, class, attempts, message
            ));
        }
    }
    Ok(())
}
