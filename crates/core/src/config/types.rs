use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::converter::ConverterConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::process::ExecutorConfig;
use crate::sweep::SweepConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub converters: ConverterConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Where the worker reads and writes files.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Converted files land here when no output path is given.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory polled by `docforge watch`.
    #[serde(default = "default_inbox_dir")]
    pub inbox_dir: PathBuf,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl StorageConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            inbox_dir: default_inbox_dir(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_inbox_dir() -> PathBuf {
    PathBuf::from("inbox")
}

fn default_poll_interval_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.orchestrator.timeout_ms, 300_000);
        assert_eq!(config.orchestrator.retry.max_attempts, 3);
        assert_eq!(config.executor.kill_grace_ms, 2000);
        assert_eq!(config.converters.tool_timeout_secs, 120);
        assert_eq!(config.sweep.retention_hours, 168);
        assert_eq!(config.storage.output_dir, PathBuf::from("output"));
        assert_eq!(config.storage.inbox_dir, PathBuf::from("inbox"));
        assert_eq!(config.storage.poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_nested_sections() {
        let toml = r#"
[orchestrator]
timeout_ms = 60000
dry_run = true

[orchestrator.retry]
max_retries = 5
initial_delay_ms = 250

[converters.tool_paths]
ffmpeg = "/opt/ffmpeg/bin/ffmpeg"

[storage]
output_dir = "/var/lib/docforge"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.orchestrator.timeout_ms, 60_000);
        assert!(config.orchestrator.dry_run);
        assert_eq!(config.orchestrator.retry.max_attempts, 5);
        assert_eq!(config.orchestrator.retry.initial_delay_ms, 250);
        assert_eq!(config.orchestrator.retry.max_delay_ms, 10_000);
        assert_eq!(
            config.converters.tool_paths.get("ffmpeg"),
            Some(&PathBuf::from("/opt/ffmpeg/bin/ffmpeg"))
        );
        assert_eq!(config.storage.output_dir, PathBuf::from("/var/lib/docforge"));
    }
}
