//! Configuration for the process executor.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`ProcessExecutor`](super::ProcessExecutor) and
/// [`ToolLocator`](super::ToolLocator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Time a child gets to exit after SIGTERM before it is killed outright.
    #[serde(default = "default_kill_grace")]
    pub kill_grace_ms: u64,

    /// Upper bound for `which`/`where` and `--version` probes.
    #[serde(default = "default_locate_timeout")]
    pub locate_timeout_ms: u64,
}

fn default_kill_grace() -> u64 {
    2000
}

fn default_locate_timeout() -> u64 {
    10_000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kill_grace_ms: default_kill_grace(),
            locate_timeout_ms: default_locate_timeout(),
        }
    }
}

impl ExecutorConfig {
    /// Sets the kill grace period.
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace_ms = grace.as_millis() as u64;
        self
    }

    /// Kill grace as a [`Duration`].
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    /// Locate timeout as a [`Duration`].
    pub fn locate_timeout(&self) -> Duration {
        Duration::from_millis(self.locate_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExecutorConfig::default();
        assert_eq!(config.kill_grace(), Duration::from_secs(2));
        assert_eq!(config.locate_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: ExecutorConfig = serde_json::from_str(r#"{"kill_grace_ms": 250}"#).unwrap();
        assert_eq!(config.kill_grace_ms, 250);
        assert_eq!(config.locate_timeout_ms, 10_000);
    }
}
