//! Bounded, single-shot execution of external commands.

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::ExecutorConfig;
use super::error::ExecutorError;
use super::types::{ExecOptions, ExecutionOutcome};

/// How the wait on the child ended.
enum Exit {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Runs external commands once, under a timeout, with guaranteed reaping.
///
/// Cheap to clone; holds only configuration.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    config: ExecutorConfig,
}

impl ProcessExecutor {
    /// Creates a new executor with the given configuration.
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Returns the executor configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Runs `program` with `args` and waits for it, the timeout, or cancellation,
    /// whichever comes first.
    ///
    /// Fails only when the process cannot be spawned. When this returns, the
    /// child has exited or been killed and reaped.
    pub async fn execute<P, S>(
        &self,
        program: P,
        args: &[S],
        options: &ExecOptions,
    ) -> Result<ExecutionOutcome, ExecutorError>
    where
        P: AsRef<OsStr>,
        S: AsRef<OsStr>,
    {
        let command = program.as_ref().to_string_lossy().to_string();
        let start = Instant::now();

        let mut cmd = Command::new(program.as_ref());
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = options.cwd {
            cmd.current_dir(dir);
        }
        cmd.envs(&options.env);

        debug!(command = %command, timeout_ms = options.timeout.as_millis() as u64, "Spawning process");

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecutorError::from_spawn(command.clone(), e))?;

        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

        let exit = tokio::select! {
            status = child.wait() => Exit::Exited(status),
            _ = tokio::time::sleep(options.timeout) => Exit::TimedOut,
            _ = cancelled(options.cancel.as_ref()) => Exit::Cancelled,
        };

        let mut outcome = ExecutionOutcome::default();
        let mut wait_error = None;

        match exit {
            Exit::Exited(Ok(status)) => {
                outcome.exit_code = status.code();
            }
            Exit::Exited(Err(e)) => {
                warn!(command = %command, error = %e, "Waiting on process failed, terminating it");
                self.terminate(&mut child, &command).await;
                wait_error = Some(e);
            }
            Exit::TimedOut => {
                warn!(
                    command = %command,
                    timeout_ms = options.timeout.as_millis() as u64,
                    "Process timed out, terminating it"
                );
                self.terminate(&mut child, &command).await;
                outcome.timed_out = true;
            }
            Exit::Cancelled => {
                debug!(command = %command, "Process cancelled, terminating it");
                self.terminate(&mut child, &command).await;
                outcome.cancelled = true;
            }
        }

        let grace = self.config.kill_grace();
        outcome.stdout = collect(stdout_task, grace).await;
        outcome.stderr = collect(stderr_task, grace).await;
        if let Some(e) = wait_error {
            outcome.stderr.push_str(&format!("\nwait failed: {}", e));
        }
        outcome.duration_ms = start.elapsed().as_millis() as u64;

        debug!(
            command = %command,
            exit_code = ?outcome.exit_code,
            timed_out = outcome.timed_out,
            cancelled = outcome.cancelled,
            duration_ms = outcome.duration_ms,
            "Process finished"
        );

        Ok(outcome)
    }

    /// Asks the child to stop, then kills it if it does not, and reaps it.
    async fn terminate(&self, child: &mut Child, command: &str) {
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                let signalled = Command::new("kill")
                    .arg("-TERM")
                    .arg(pid.to_string())
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .await
                    .map(|s| s.success())
                    .unwrap_or(false);

                if signalled {
                    if let Ok(Ok(_)) =
                        tokio::time::timeout(self.config.kill_grace(), child.wait()).await
                    {
                        return;
                    }
                    debug!(command = %command, "Process ignored SIGTERM, killing it");
                }
            }
        }

        // SIGTERM was ignored or never sent; on Windows this is the only path.
        if let Err(e) = child.kill().await {
            debug!(command = %command, error = %e, "Kill failed, process already gone");
        }
    }
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        let _ = stream.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Joins a reader task, giving up after `grace` (a grandchild may hold the pipe open).
async fn collect(handle: JoinHandle<String>, grace: Duration) -> String {
    let abort = handle.abort_handle();
    match tokio::time::timeout(grace, handle).await {
        Ok(Ok(output)) => output,
        Ok(Err(_)) => String::new(),
        Err(_) => {
            abort.abort();
            String::new()
        }
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn executor() -> ProcessExecutor {
        ProcessExecutor::new(ExecutorConfig::default().with_kill_grace(Duration::from_millis(500)))
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let outcome = executor()
            .execute("sh", &sh("echo out; echo err >&2"), &ExecOptions::with_timeout_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.stdout.trim(), "out");
        assert_eq!(outcome.stderr.trim(), "err");
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.success());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let outcome = executor()
            .execute("sh", &sh("exit 3"), &ExecOptions::with_timeout_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.timed_out);
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let start = Instant::now();
        let outcome = executor()
            .execute(
                "sleep",
                &["5".to_string()],
                &ExecOptions::new(Duration::from_millis(200)),
            )
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
        assert!(!outcome.cancelled);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_sigterm_ignored_falls_back_to_kill() {
        let start = Instant::now();
        let outcome = executor()
            .execute(
                "sh",
                &sh("trap '' TERM; sleep 5"),
                &ExecOptions::new(Duration::from_millis(200)),
            )
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_cancellation_terminates_process() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let outcome = executor()
            .execute(
                "sleep",
                &["5".to_string()],
                &ExecOptions::with_timeout_secs(30).cancel_on(token),
            )
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let result = executor()
            .execute(
                "definitely-not-a-real-binary-xyz",
                &[] as &[String],
                &ExecOptions::with_timeout_secs(5),
            )
            .await;

        assert!(matches!(result, Err(ExecutorError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_env_and_cwd_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let options = ExecOptions::with_timeout_secs(5)
            .cwd(dir.path())
            .env("DOCFORGE_TEST_VALUE", "42");

        let outcome = executor()
            .execute("sh", &sh("echo $DOCFORGE_TEST_VALUE; pwd"), &options)
            .await
            .unwrap();

        let lines: Vec<&str> = outcome.stdout.lines().collect();
        assert_eq!(lines[0], "42");
        let reported = std::fs::canonicalize(lines[1]).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }
}
