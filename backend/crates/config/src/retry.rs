use std::time::Duration;

use dust_common::error::{DustError, DustResult};
use serde::Deserialize;

/// Backoff policy applied to every activity call made by a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 500,
            backoff_cap_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base_ms: u64, backoff_cap_ms: u64) -> DustResult<Self> {
        if max_attempts == 0 {
            return Err(DustError::Config(
                "retry max_attempts must be at least 1".to_owned(),
            ));
        }
        if backoff_cap_ms < backoff_base_ms {
            return Err(DustError::Config(format!(
                "retry backoff cap ({backoff_cap_ms}ms) is below the base ({backoff_base_ms}ms)"
            )));
        }
        Ok(Self {
            max_attempts,
            backoff_base_ms,
            backoff_cap_ms,
        })
    }

    /// Delay to wait after the given failed attempt (1-based):
    /// `min(base * 2^(attempt - 1), cap)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .backoff_base_ms
            .saturating_mul(1u64 << exponent)
            .min(self.backoff_cap_ms);
        Duration::from_millis(delay)
    }

    /// Delay after a failed attempt when the remote asked for `retry_after`.
    /// The server hint wins when it is longer, but never exceeds the cap.
    pub fn backoff_with_hint(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = self.backoff(attempt);
        match retry_after {
            Some(hint) => hint
                .max(computed)
                .min(Duration::from_millis(self.backoff_cap_ms)),
            None => computed,
        }
    }
}
