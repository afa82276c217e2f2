//! Throughput optimizer
//!
//! Keeps a rolling performance profile per tenant and derives the batch
//! size, concurrency and inter-batch delay the engine should use next.
//! Tier decisions look at the last `outcome_window` write outcomes only;
//! lifetime totals are kept for reporting.
//!
//! ## Tiers
//!
//! - **ColdStart**: no history; conservative defaults, concurrency 1
//! - **Degraded**: success rate below the degraded threshold, or a
//!   rate-limit error within the lookback window; minimum batch size,
//!   concurrency 1, long delay
//! - **Healthy**: success rate at or above the healthy threshold; sizes
//!   scale toward the configured ceilings, scaled by how much history backs
//!   the profile and dampened when latency exceeds the target
//! - **Steady**: anything in between; default sizing with adaptive backoff
//!
//! The derivation itself ([`derive_batch_config`]) is a pure function of the
//! profile, the configuration and the current time.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};

use catsync_core::config::OptimizerSettings;
use catsync_core::domain::TenantId;
use catsync_core::ports::ErrorCode;

// ============================================================================
// OptimizerConfig
// ============================================================================

/// Thresholds and limits for [`derive_batch_config`]
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    pub min_batch_size: usize,
    pub default_batch_size: usize,
    pub max_batch_size: usize,
    pub default_concurrency: usize,
    pub max_concurrency: usize,
    pub default_delay: Duration,
    pub min_delay: Duration,
    pub degraded_delay: Duration,
    pub healthy_success_rate: f64,
    pub degraded_success_rate: f64,
    pub rate_limit_lookback: Duration,
    pub error_retention: Duration,
    pub max_recent_errors: usize,
    /// Outcomes the rolling success rate is computed over
    pub outcome_window: usize,
    /// Outcomes in the window needed before healthy sizing reaches the ceilings
    pub warmup_requests: u64,
    pub target_latency: Duration,
    /// Weight of the newest latency sample in the rolling average
    pub latency_smoothing: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::from(&OptimizerSettings::default())
    }
}

impl From<&OptimizerSettings> for OptimizerConfig {
    fn from(s: &OptimizerSettings) -> Self {
        let min_batch_size = s.min_batch_size.max(1);
        let max_batch_size = s.max_batch_size.max(min_batch_size);
        let default_concurrency = s.default_concurrency.max(1);
        let outcome_window = s.outcome_window.max(1);
        Self {
            min_batch_size,
            default_batch_size: s.default_batch_size.clamp(min_batch_size, max_batch_size),
            max_batch_size,
            default_concurrency,
            max_concurrency: s.max_concurrency.max(default_concurrency),
            default_delay: Duration::from_millis(s.default_delay_ms),
            min_delay: Duration::from_millis(s.min_delay_ms.min(s.default_delay_ms)),
            degraded_delay: Duration::from_millis(s.degraded_delay_ms),
            healthy_success_rate: s.healthy_success_rate,
            degraded_success_rate: s.degraded_success_rate,
            rate_limit_lookback: Duration::from_secs(s.rate_limit_lookback_secs),
            error_retention: Duration::from_secs(s.error_retention_secs),
            max_recent_errors: s.max_recent_errors.max(1),
            outcome_window,
            warmup_requests: s.warmup_requests.clamp(1, outcome_window as u64),
            target_latency: Duration::from_millis(s.target_latency_ms.max(1)),
            latency_smoothing: s.latency_smoothing.clamp(f64::EPSILON, 1.0),
        }
    }
}

// ============================================================================
// Outcome / PerformanceProfile
// ============================================================================

/// One observed write attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub success: bool,
    pub latency: Duration,
    /// Service error code for failures, when one was reported
    pub error_code: Option<ErrorCode>,
}

impl Outcome {
    pub fn success(latency: Duration) -> Self {
        Self {
            success: true,
            latency,
            error_code: None,
        }
    }

    pub fn failure(latency: Duration, error_code: Option<ErrorCode>) -> Self {
        Self {
            success: false,
            latency,
            error_code,
        }
    }
}

/// A failed request kept for tier decisions
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub code: Option<ErrorCode>,
    pub at: DateTime<Utc>,
}

/// Rolling request statistics for one tenant
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceProfile {
    /// Lifetime count, for reporting
    pub total_requests: u64,
    /// Lifetime count, for reporting
    pub successful_requests: u64,
    /// Success flags of the most recent outcomes, oldest first
    pub recent_outcomes: VecDeque<bool>,
    /// Exponentially weighted average latency
    pub avg_latency: Duration,
    /// Oldest first, pruned by age and capped in length
    pub recent_errors: VecDeque<ErrorRecord>,
    pub updated_at: DateTime<Utc>,
}

impl PerformanceProfile {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            recent_outcomes: VecDeque::new(),
            avg_latency: Duration::ZERO,
            recent_errors: VecDeque::new(),
            updated_at: now,
        }
    }

    pub fn failed_requests(&self) -> u64 {
        self.total_requests - self.successful_requests
    }

    /// Fraction of successes within the outcome window; 1.0 when empty
    pub fn success_rate(&self) -> f64 {
        if self.recent_outcomes.is_empty() {
            return 1.0;
        }
        let ok = self.recent_outcomes.iter().filter(|&&success| success).count();
        ok as f64 / self.recent_outcomes.len() as f64
    }

    /// Fraction of successes since the profile was created
    pub fn lifetime_success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 1.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }

    /// True if a rate-limit error was recorded within `lookback` of `now`
    pub fn rate_limited_within(&self, lookback: Duration, now: DateTime<Utc>) -> bool {
        let Ok(lookback) = chrono::Duration::from_std(lookback) else {
            return !self.recent_errors.is_empty();
        };
        self.recent_errors.iter().any(|e| {
            e.code.as_ref() == Some(&ErrorCode::RateLimited) && now - e.at <= lookback
        })
    }

    fn apply(&mut self, outcome: &Outcome, config: &OptimizerConfig, now: DateTime<Utc>) {
        self.avg_latency = if self.total_requests == 0 {
            outcome.latency
        } else {
            let alpha = config.latency_smoothing;
            self.avg_latency
                .mul_f64(1.0 - alpha)
                .saturating_add(outcome.latency.mul_f64(alpha))
        };

        self.total_requests += 1;
        self.recent_outcomes.push_back(outcome.success);
        while self.recent_outcomes.len() > config.outcome_window {
            self.recent_outcomes.pop_front();
        }
        if outcome.success {
            self.successful_requests += 1;
        } else {
            self.recent_errors.push_back(ErrorRecord {
                code: outcome.error_code.clone(),
                at: now,
            });
        }

        if let Ok(retention) = chrono::Duration::from_std(config.error_retention) {
            while self
                .recent_errors
                .front()
                .is_some_and(|e| now - e.at > retention)
            {
                self.recent_errors.pop_front();
            }
        }
        while self.recent_errors.len() > config.max_recent_errors {
            self.recent_errors.pop_front();
        }
        self.updated_at = now;
    }
}

// ============================================================================
// BatchConfig
// ============================================================================

/// Performance tier a [`BatchConfig`] was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    ColdStart,
    Steady,
    Healthy,
    Degraded,
}

impl fmt::Display for PerformanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PerformanceTier::ColdStart => "cold_start",
            PerformanceTier::Steady => "steady",
            PerformanceTier::Healthy => "healthy",
            PerformanceTier::Degraded => "degraded",
        };
        write!(f, "{}", s)
    }
}

/// Write parameters for the next round of batches
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub concurrency: usize,
    pub inter_batch_delay: Duration,
    /// Whether the caller should back off more aggressively than usual
    pub adaptive_backoff: bool,
    pub tier: PerformanceTier,
}

fn lerp_usize(from: usize, to: usize, t: f64) -> usize {
    if to <= from {
        return from;
    }
    from + ((to - from) as f64 * t).round() as usize
}

/// Derives a [`BatchConfig`] from a tenant profile
///
/// Pure: the same profile, configuration and time always yield the same
/// result.
pub fn derive_batch_config(
    profile: Option<&PerformanceProfile>,
    config: &OptimizerConfig,
    now: DateTime<Utc>,
) -> BatchConfig {
    let profile = match profile {
        Some(p) if !p.recent_outcomes.is_empty() => p,
        _ => {
            return BatchConfig {
                batch_size: config.default_batch_size,
                concurrency: 1,
                inter_batch_delay: config.default_delay,
                adaptive_backoff: false,
                tier: PerformanceTier::ColdStart,
            }
        }
    };

    let success_rate = profile.success_rate();
    let rate_limited = profile.rate_limited_within(config.rate_limit_lookback, now);

    if rate_limited || success_rate < config.degraded_success_rate {
        return BatchConfig {
            batch_size: config.min_batch_size,
            concurrency: 1,
            inter_batch_delay: config.degraded_delay.max(config.default_delay),
            adaptive_backoff: true,
            tier: PerformanceTier::Degraded,
        };
    }

    if success_rate >= config.healthy_success_rate {
        let confidence =
            (profile.recent_outcomes.len() as f64 / config.warmup_requests as f64).min(1.0);
        let latency_factor = if profile.avg_latency > config.target_latency {
            config.target_latency.as_secs_f64() / profile.avg_latency.as_secs_f64()
        } else {
            1.0
        };
        let scale = (confidence * latency_factor).clamp(0.0, 1.0);

        let delay_span = config.default_delay.saturating_sub(config.min_delay);
        return BatchConfig {
            batch_size: lerp_usize(config.default_batch_size, config.max_batch_size, scale),
            concurrency: lerp_usize(config.default_concurrency, config.max_concurrency, scale),
            inter_batch_delay: config.default_delay.saturating_sub(delay_span.mul_f64(scale)),
            adaptive_backoff: false,
            tier: PerformanceTier::Healthy,
        };
    }

    BatchConfig {
        batch_size: config.default_batch_size,
        concurrency: config.default_concurrency,
        inter_batch_delay: config.default_delay,
        adaptive_backoff: true,
        tier: PerformanceTier::Steady,
    }
}

// ============================================================================
// ThroughputOptimizer
// ============================================================================

/// Per-tenant profile store and batch config source
///
/// Thread-safe and designed to be shared via `Arc<ThroughputOptimizer>`.
#[derive(Debug, Default)]
pub struct ThroughputOptimizer {
    config: OptimizerConfig,
    profiles: DashMap<TenantId, PerformanceProfile>,
}

impl ThroughputOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            profiles: DashMap::new(),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Records one write attempt for `tenant`
    pub fn record_outcome(&self, tenant: &TenantId, outcome: Outcome) {
        self.record_outcome_at(tenant, outcome, Utc::now());
    }

    /// Records one write attempt observed at `now`
    pub fn record_outcome_at(&self, tenant: &TenantId, outcome: Outcome, now: DateTime<Utc>) {
        let mut profile = self
            .profiles
            .entry(tenant.clone())
            .or_insert_with(|| PerformanceProfile::new(now));

        let before = derive_batch_config(Some(&*profile), &self.config, now).tier;
        profile.apply(&outcome, &self.config, now);
        let after = derive_batch_config(Some(&*profile), &self.config, now).tier;

        debug!(
            tenant = %tenant,
            success = outcome.success,
            latency_ms = outcome.latency.as_millis() as u64,
            total = profile.total_requests,
            success_rate = profile.success_rate(),
            "Recorded write outcome"
        );

        if before != after && profile.total_requests > 1 {
            info!(tenant = %tenant, from = %before, to = %after, "Performance tier changed");
        }
    }

    /// Derives the current batch config for `tenant`
    pub fn get_batch_config(&self, tenant: &TenantId) -> BatchConfig {
        self.get_batch_config_at(tenant, Utc::now())
    }

    pub fn get_batch_config_at(&self, tenant: &TenantId, now: DateTime<Utc>) -> BatchConfig {
        let profile = self.profiles.get(tenant);
        derive_batch_config(profile.as_deref(), &self.config, now)
    }

    /// Snapshot of the tenant's profile, `None` before the first outcome
    pub fn profile(&self, tenant: &TenantId) -> Option<PerformanceProfile> {
        self.profiles.get(tenant).map(|p| p.clone())
    }

    /// Drops the tenant's profile; returns true if one existed
    pub fn reset(&self, tenant: &TenantId) -> bool {
        self.profiles.remove(tenant).is_some()
    }
}
