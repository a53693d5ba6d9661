//! Sweep configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the expiry sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// How long terminal jobs are kept (hours).
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Delay between sweeps when running in the background (seconds).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Delete input and output files of expired jobs.
    #[serde(default = "default_remove_artifacts")]
    pub remove_artifacts: bool,
}

fn default_retention_hours() -> u64 {
    168 // 7 days
}

fn default_interval() -> u64 {
    3600
}

fn default_remove_artifacts() -> bool {
    true
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            retention_hours: default_retention_hours(),
            interval_secs: default_interval(),
            remove_artifacts: default_remove_artifacts(),
        }
    }
}

impl SweepConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours.saturating_mul(3600))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
