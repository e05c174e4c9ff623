//! Upload retry policy.
//!
//! The blob store sees transient faults (connection resets, throttling)
//! that a second attempt usually clears. Retries stay inside the batch
//! executor so the saga's compensation logic only ever sees settled
//! outcomes. The default is a single attempt; deployments opt in to
//! retries through the environment.

use std::time::Duration;

/// Default number of attempts per blob (1 = no retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;

/// Default pause between attempts in milliseconds.
pub const DEFAULT_BACKOFF_MS: u64 = 200;

/// Per-blob upload retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per blob, including the first.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `KEEPSAKE_UPLOAD_MAX_ATTEMPTS` | `1` | Attempts per blob, including the first |
    /// | `KEEPSAKE_UPLOAD_BACKOFF_MS` | `200` | Pause between attempts |
    pub fn from_env() -> Self {
        let max_attempts = std::env::var("KEEPSAKE_UPLOAD_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_ATTEMPTS)
            .max(1);

        let backoff = std::env::var("KEEPSAKE_UPLOAD_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_BACKOFF_MS));

        Self {
            max_attempts,
            backoff,
        }
    }

    /// Set the total attempts per blob (floored at 1).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    /// Set the pause between attempts.
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_single_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn test_builder_floors_attempts_at_one() {
        let policy = RetryPolicy::default().max_attempts(0);
        assert_eq!(policy.max_attempts, 1);
    }
}
