//! Cross-platform lookup of external executables.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::executor::ProcessExecutor;
use super::types::ExecOptions;

static VERSION_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)+)").ok());

/// A located tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub path: PathBuf,
    pub version: Option<String>,
}

/// Finds external executables via configured paths, then `which`/`where`.
///
/// Absence is an expected condition: every lookup failure is `None`.
#[derive(Debug, Clone)]
pub struct ToolLocator {
    executor: ProcessExecutor,
    overrides: HashMap<String, PathBuf>,
}

impl ToolLocator {
    /// Creates a locator. `overrides` maps tool names to explicit paths.
    pub fn new(executor: ProcessExecutor, overrides: HashMap<String, PathBuf>) -> Self {
        Self {
            executor,
            overrides,
        }
    }

    /// Returns the executor this locator probes with.
    pub fn executor(&self) -> &ProcessExecutor {
        &self.executor
    }

    /// Resolves `tool` to a path, or `None` if it is not installed.
    pub async fn locate(&self, tool: &str) -> Option<PathBuf> {
        if let Some(path) = self.overrides.get(tool) {
            if path.exists() {
                return Some(path.clone());
            }
            debug!(tool, path = %path.display(), "Configured tool path does not exist, searching PATH");
        }

        let resolver = if cfg!(windows) { "where" } else { "which" };
        let options = ExecOptions::new(self.executor.config().locate_timeout());

        let outcome = match self.executor.execute(resolver, &[tool], &options).await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(tool, resolver, error = %e, "Tool resolver unavailable");
                return None;
            }
        };

        if !outcome.success() {
            debug!(tool, "Tool not found");
            return None;
        }

        first_line(&outcome.stdout).map(PathBuf::from)
    }

    /// Resolves the first of several aliases that is installed.
    pub async fn locate_any(&self, candidates: &[&str]) -> Option<(String, PathBuf)> {
        for candidate in candidates {
            if let Some(path) = self.locate(candidate).await {
                return Some((candidate.to_string(), path));
            }
        }
        None
    }

    /// Runs `<path> --version` and extracts a version string.
    pub async fn version(&self, path: &Path) -> Option<String> {
        let options = ExecOptions::new(self.executor.config().locate_timeout());
        let outcome = self.executor.execute(path, &["--version"], &options).await.ok()?;
        if outcome.timed_out || outcome.cancelled {
            return None;
        }

        // Some tools print their banner to stderr.
        let line = first_line(&outcome.stdout).or_else(|| first_line(&outcome.stderr))?;
        Some(parse_version(&line).unwrap_or(line))
    }

    /// Locates `tool` and reads its version.
    pub async fn probe(&self, tool: &str) -> Option<ToolInfo> {
        let path = self.locate(tool).await?;
        let version = self.version(&path).await;
        Some(ToolInfo {
            name: tool.to_string(),
            path,
            version,
        })
    }
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Extracts the first dotted version number from a banner line.
pub(crate) fn parse_version(line: &str) -> Option<String> {
    let re = VERSION_RE.as_ref()?;
    re.captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
