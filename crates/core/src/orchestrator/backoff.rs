//! Retry delay computation.

use std::time::Duration;

use super::config::RetryConfig;

/// Delay to wait after attempt `attempt` (1-based) failed.
///
/// `initial * multiplier^(attempt - 1)`, capped at `max_delay`.
pub fn backoff_delay(attempt: u32, retry: &RetryConfig) -> Duration {
    let exponent = attempt.saturating_sub(1).min(64) as i32;
    let raw = retry.initial_delay_ms as f64 * retry.backoff_multiplier.powi(exponent);
    let capped = raw.min(retry.max_delay_ms as f64);
    if capped.is_finite() && capped > 0.0 {
        Duration::from_millis(capped as u64)
    } else {
        Duration::ZERO
    }
}

/// [`backoff_delay`] with the default policy: `min(1000 * 2^(attempt-1), 10000)` ms.
pub fn backoff(attempt: u32) -> Duration {
    backoff_delay(attempt, &RetryConfig::default())
}
