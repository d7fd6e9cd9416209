//! Retry and error recovery policy for oracle tasks
//!
//! Provides exponential backoff, a per-task circuit breaker and the
//! classification of submission failures.

use std::time::Duration;
use tracing::debug;
use transfer_gateway::{ErrorKind, GatewayError};

use crate::error::OracleError;

/// Backoff configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate backoff duration for a given attempt (0-indexed)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

/// Circuit breaker configuration for oracle tasks
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before pausing
    pub threshold: u32,
    /// How long to pause when circuit breaker trips
    pub pause_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 10,
            pause_duration: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// What a task does with the result of one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The effect is on the ledger (now or from an earlier submission)
    Applied,
    /// Worth trying again next cycle (RPC failure, confirmations, storage)
    Retry,
    /// The gateway will never accept this submission from us
    Rejected,
}

/// Classify a failed submission by its typed kind
pub fn classify(error: &OracleError) -> Disposition {
    // Same hash, different contents: a conflict, not our effect
    if let Some(GatewayError::AlreadyProcessed { .. }) = error.gateway() {
        return Disposition::Rejected;
    }
    let disposition = match error.kind() {
        ErrorKind::Replay => Disposition::Applied,
        ErrorKind::Transient => Disposition::Retry,
        ErrorKind::Policy => Disposition::Rejected,
    };
    debug!(error = %error, ?disposition, "Classified submission failure");
    disposition
}
