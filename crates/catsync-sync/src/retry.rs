//! Adaptive retry controller
//!
//! Drives one logical write through the attempt state machine:
//!
//! ```text
//! Pending -> Attempting -> Succeeded
//!                       -> Conflicted      -> (refresh + reconcile) -> Attempting
//!                       -> RetryableFailed -> (backoff sleep)       -> Attempting
//!                       -> FatalFailed
//! ```
//!
//! Every transition back to `Attempting` counts against the attempt budget.
//! Backoff sleeps are exponential with jitter, capped at the policy's
//! maximum, raised to any server `Retry-After`, and interruptible through a
//! [`CancellationToken`].

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use catsync_conflict::{ConflictDetector, ErrorClass};
use catsync_core::config::RetryConfig;
use catsync_core::ports::CatalogError;

// ============================================================================
// RetryPolicy
// ============================================================================

/// Parameters of one retry loop
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    /// Random spread as a fraction of the delay (0.2 = ±20%)
    pub jitter: f64,
    pub max_delay: Duration,
    /// Classes that may be retried; anything else terminates immediately
    pub retryable: HashSet<ErrorClass>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter.clamp(0.0, 1.0),
            max_delay: Duration::from_millis(config.max_delay_ms),
            retryable: [ErrorClass::VersionConflict, ErrorClass::Retryable]
                .into_iter()
                .collect(),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn with_retryable(mut self, classes: impl IntoIterator<Item = ErrorClass>) -> Self {
        self.retryable = classes.into_iter().collect();
        self
    }

    pub fn is_retryable(&self, class: ErrorClass) -> bool {
        self.retryable.contains(&class)
    }

    /// Delay before retry number `attempt` (1-based), without jitter
    ///
    /// `base × multiplier^(attempt-1)`, capped at `max_delay`.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Delay before retry number `attempt` (1-based), with jitter applied
    ///
    /// The jittered value is capped at `max_delay` as well.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if self.jitter <= 0.0 {
            return nominal;
        }
        // factor in [1 - jitter, 1 + jitter)
        let factor = 1.0 + self.jitter * (fastrand::f64() * 2.0 - 1.0);
        nominal.mul_f64(factor).min(self.max_delay)
    }
}

// ============================================================================
// States and errors
// ============================================================================

/// State of the attempt loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Pending,
    Attempting,
    Succeeded,
    Conflicted,
    RetryableFailed,
    FatalFailed,
}

/// Why a retry loop gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    /// The error class is not retryable under the policy
    FatalFailed,
    /// The attempt budget ran out
    Exhausted,
    /// The cancellation token fired before the next attempt
    Cancelled,
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminalState::FatalFailed => "failed",
            TerminalState::Exhausted => "retries exhausted",
            TerminalState::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Terminal failure of [`with_adaptive_retry`]
#[derive(Debug, Clone, Error)]
#[error("{state} after {attempts} attempt(s) ({class}): {source}")]
pub struct RetryError {
    pub state: TerminalState,
    /// Attempts made, including the first
    pub attempts: u32,
    /// Classification of the last error
    pub class: ErrorClass,
    /// The last error observed
    pub source: CatalogError,
}

/// Successful result of [`with_adaptive_retry`]
#[derive(Debug, Clone)]
pub struct RetrySuccess<T> {
    pub value: T,
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// Number of conflicts recovered along the way
    pub conflicts: u32,
}

// ============================================================================
// RetryableWrite
// ============================================================================

/// A write that can be attempted repeatedly
///
/// `refresh_after_conflict` is called after a version conflict and before
/// the next attempt; implementations re-read remote state and reconcile
/// whatever they are about to write.
#[async_trait::async_trait]
pub trait RetryableWrite: Send {
    type Output: Send;

    /// Performs one attempt (`attempt` is 1-based)
    async fn attempt(&mut self, attempt: u32) -> Result<Self::Output, CatalogError>;

    async fn refresh_after_conflict(&mut self, _error: &CatalogError) -> Result<(), CatalogError> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl<F, Fut, T> RetryableWrite for F
where
    F: FnMut(u32) -> Fut + Send,
    Fut: Future<Output = Result<T, CatalogError>> + Send,
    T: Send,
{
    type Output = T;

    async fn attempt(&mut self, attempt: u32) -> Result<T, CatalogError> {
        (self)(attempt).await
    }
}

// ============================================================================
// with_adaptive_retry
// ============================================================================

/// Sleeps for `delay` unless `cancel` fires first; returns false if cancelled
async fn backoff_sleep(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Runs `write` until it succeeds, fails fatally, runs out of attempts or
/// is cancelled
pub async fn with_adaptive_retry<W>(
    write: &mut W,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<RetrySuccess<W::Output>, RetryError>
where
    W: RetryableWrite,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut state = RetryState::Pending;
    let mut conflicts = 0u32;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        trace!(from = ?state, attempt, "Entering Attempting");
        state = RetryState::Attempting;

        let error = match write.attempt(attempt).await {
            Ok(value) => {
                state = RetryState::Succeeded;
                if attempt > 1 {
                    info!(attempt, conflicts, "Write succeeded after retry");
                }
                trace!(state = ?state, attempt, "Retry loop finished");
                return Ok(RetrySuccess {
                    value,
                    attempts: attempt,
                    conflicts,
                });
            }
            Err(e) => e,
        };

        let class = ConflictDetector::classify_error(&error);
        let fail = |state: TerminalState, source: CatalogError, class: ErrorClass| RetryError {
            state,
            attempts: attempt,
            class,
            source,
        };

        if !policy.is_retryable(class) {
            state = RetryState::FatalFailed;
            warn!(attempt, class = %class, error = %error, "Write failed, not retryable");
            trace!(state = ?state, "Retry loop finished");
            return Err(fail(TerminalState::FatalFailed, error, class));
        }

        if attempt >= max_attempts {
            warn!(attempt, class = %class, error = %error, "Write failed, attempt budget exhausted");
            return Err(fail(TerminalState::Exhausted, error, class));
        }

        // Cancellation is honoured between attempts, never mid-request
        if cancel.is_cancelled() {
            return Err(fail(TerminalState::Cancelled, error, class));
        }

        if class == ErrorClass::VersionConflict {
            state = RetryState::Conflicted;
            debug!(attempt, state = ?state, "Version conflict, refreshing remote state");
            match write.refresh_after_conflict(&error).await {
                Ok(()) => {
                    conflicts += 1;
                    continue;
                }
                Err(refresh_error) => {
                    let refresh_class = ConflictDetector::classify_error(&refresh_error);
                    if refresh_class != ErrorClass::Retryable || !policy.is_retryable(refresh_class)
                    {
                        state = RetryState::FatalFailed;
                        warn!(
                            attempt,
                            state = ?state,
                            error = %refresh_error,
                            "Refresh after conflict failed"
                        );
                        return Err(fail(
                            TerminalState::FatalFailed,
                            refresh_error,
                            refresh_class,
                        ));
                    }
                    // Transient refresh failure: back off, then the write
                    // conflicts again and the refresh is retried
                    debug!(error = %refresh_error, "Refresh failed transiently");
                }
            }
        }

        state = RetryState::RetryableFailed;
        let mut delay = policy.backoff_delay(attempt);
        if let Some(retry_after) = error.retry_after() {
            delay = delay.max(retry_after);
        }
        warn!(
            attempt,
            max_attempts,
            class = %class,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Write failed, backing off"
        );

        if !backoff_sleep(delay, cancel).await {
            info!(attempt, "Backoff interrupted by cancellation");
            return Err(fail(TerminalState::Cancelled, error, class));
        }
    }
}
