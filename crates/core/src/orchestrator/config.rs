//! Orchestrator configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the conversion orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Deadline for a single conversion attempt (milliseconds).
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// How long an abandoned attempt may take to reap its process (milliseconds).
    #[serde(default = "default_cleanup_grace")]
    pub cleanup_grace_ms: u64,

    /// Converters write placeholders instead of running external tools.
    #[serde(default)]
    pub dry_run: bool,

    /// Retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Retry policy for failed attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per job, including the first.
    #[serde(default = "default_max_attempts", alias = "max_retries")]
    pub max_attempts: u32,

    /// Delay after the first failed attempt (milliseconds).
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay (milliseconds).
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_timeout() -> u64 {
    300_000 // 5 minutes
}

fn default_cleanup_grace() -> u64 {
    2000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout(),
            cleanup_grace_ms: default_cleanup_grace(),
            dry_run: false,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl OrchestratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cleanup_grace(&self) -> Duration {
        Duration::from_millis(self.cleanup_grace_ms)
    }

    /// Sets the per-attempt deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the cleanup grace period.
    pub fn with_cleanup_grace(mut self, grace: Duration) -> Self {
        self.cleanup_grace_ms = grace.as_millis() as u64;
        self
    }

    /// Enables or disables dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Replaces the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl RetryConfig {
    /// Sets the total number of attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the initial and maximum delays.
    pub fn with_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay_ms = initial.as_millis() as u64;
        self.max_delay_ms = max.as_millis() as u64;
        self
    }
}
