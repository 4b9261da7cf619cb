//! Error taxonomy (§7): tagged variants, not exception types. Scanners and
//! adapters never propagate transient errors upward — they log and
//! continue. The Coordinator surfaces terminal causes into
//! `ExecutionResult::error` and the notification channel.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("transient error from {source} (retryable)")]
    Transient { source: String },

    #[error("quote unavailable for {pair} on {venue}")]
    QuoteUnavailable { venue: String, pair: String },

    #[error("risk rejected: {reason}")]
    RiskRejected { reason: String },

    #[error("opportunity is stale")]
    Stale,

    #[error("execution failed partway at step {step_index} ({cause})")]
    ExecutionPartial { step_index: usize, cause: String },

    #[error("flash-loan path reverted on-chain: {cause}")]
    ExecutionAtomicFailed { cause: String },

    #[error("deadline exceeded at stage {stage}")]
    Timeout { stage: String },

    #[error("fatal: {cause}")]
    Fatal { cause: String },
}

impl CoreError {
    /// Whether the Orchestrator should retry the originating operation,
    /// per the §7 propagation policy.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient { .. })
    }
}

/// Exponential backoff with jitter, grounded in `executor.rs`'s
/// `try_backup_providers` fallback-chain pattern: max 3 attempts, 20%
/// jitter (§7).
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: std::time::Duration,
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: std::time::Duration::from_millis(200),
            jitter_fraction: 0.20,
        }
    }
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let exp = self.base_delay.as_millis() as f64 * 2f64.powi(attempt as i32);
        let jitter = exp * self.jitter_fraction * (rand::random::<f64>() * 2.0 - 1.0);
        std::time::Duration::from_millis((exp + jitter).max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_retryable() {
        assert!(CoreError::Transient {
            source: "rpc".into()
        }
        .is_retryable());
        assert!(!CoreError::Fatal {
            cause: "bad config".into()
        }
        .is_retryable());
    }

    #[test]
    fn retry_delay_grows_with_attempt() {
        let policy = RetryPolicy::default();
        let d0 = policy.delay_for_attempt(0).as_millis();
        let d2 = policy.delay_for_attempt(2).as_millis();
        assert!(d2 > d0);
    }
}
