//! Types shared by the executor and its callers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Options for a single [`ProcessExecutor::execute`](super::ProcessExecutor::execute) call.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Wall-clock limit for the process.
    pub timeout: Duration,
    /// Working directory (inherits the worker's when `None`).
    pub cwd: Option<PathBuf>,
    /// Extra environment variables, added on top of the inherited environment.
    pub env: HashMap<String, String>,
    /// Cancelling this token terminates the process like a timeout does.
    pub cancel: Option<CancellationToken>,
}

impl ExecOptions {
    /// Creates options with the given timeout and nothing else.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cwd: None,
            env: HashMap::new(),
            cancel: None,
        }
    }

    /// Creates options with a timeout expressed in seconds.
    pub fn with_timeout_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Sets the working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Adds an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Ties the process lifetime to a cancellation token.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// What happened to one external process.
///
/// Exactly one of three things is true: the process exited on its own
/// (`exit_code` may still be `None` when it died from a signal), it was
/// killed because of the timeout (`timed_out`), or it was killed because
/// the caller cancelled (`cancelled`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl ExecutionOutcome {
    /// True when the process exited by itself with status 0.
    pub fn success(&self) -> bool {
        !self.timed_out && !self.cancelled && self.exit_code == Some(0)
    }

    /// The last `max_chars` characters of stderr, for error messages.
    pub fn stderr_tail(&self, max_chars: usize) -> String {
        let trimmed = self.stderr.trim();
        let count = trimmed.chars().count();
        if count <= max_chars {
            return trimmed.to_string();
        }
        trimmed.chars().skip(count - max_chars).collect()
    }

    /// One-line description of a failed outcome.
    pub fn failure_reason(&self, tool: &str) -> String {
        if self.timed_out {
            format!("{} timed out after {} ms", tool, self.duration_ms)
        } else if self.cancelled {
            format!("{} was cancelled", tool)
        } else {
            let tail = self.stderr_tail(500);
            match (self.exit_code, tail.is_empty()) {
                (Some(code), true) => format!("{} exited with code {}", tool, code),
                (Some(code), false) => format!("{} exited with code {}: {}", tool, code, tail),
                (None, _) => format!("{} was terminated by a signal", tool),
            }
        }
    }
}
