//! Orchestrator timeouts reaching real child processes.
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Map;
use tempfile::TempDir;

use docforge_core::{
    testing::fixtures, ConversionOrchestrator, ConversionResult, ConvertOptions, Converter,
    ConverterInfo, ConverterRegistry, ErrorKind, ExecOptions, JobRepository, JobStatus,
    MemoryJobRepository, NewJob, ProcessExecutor,
};

/// Runs `sh` scripts through the executor, recording the child pid.
struct ShellConverter {
    executor: ProcessExecutor,
    script: String,
    pid_file: PathBuf,
}

#[async_trait]
impl Converter for ShellConverter {
    fn info(&self) -> ConverterInfo {
        ConverterInfo::new("shell", "Shell script")
            .inputs(&[".sh"])
            .outputs(&["out"])
            .tools(&["sh"])
    }

    async fn convert(&self, input: &Path, output: &Path, options: &ConvertOptions) -> ConversionResult {
        let args = [
            "-c".to_string(),
            self.script.clone(),
            "shell".to_string(),
            self.pid_file.display().to_string(),
            input.display().to_string(),
            output.display().to_string(),
        ];
        let exec = ExecOptions::new(Duration::from_secs(60)).cancel_on(options.cancel.clone());
        match self.executor.execute("sh", &args, &exec).await {
            Ok(outcome) if outcome.success() => ConversionResult::ok(Map::new()),
            Ok(outcome) => ConversionResult::failed(outcome.failure_reason("sh")),
            Err(e) => ConversionResult::failed(e.to_string()),
        }
    }
}

fn orchestrator(
    converter: ShellConverter,
    repository: &Arc<MemoryJobRepository>,
    timeout: Duration,
) -> ConversionOrchestrator {
    let mut builder = ConverterRegistry::builder();
    builder.register_converter(Arc::new(converter));
    let config = fixtures::fast_config()
        .with_timeout(timeout)
        .with_cleanup_grace(Duration::from_secs(5));
    let config = config.clone().with_retry(config.retry.with_max_attempts(1));
    ConversionOrchestrator::new(
        Arc::new(builder.build()),
        Arc::clone(repository) as Arc<dyn JobRepository>,
        config,
    )
}

fn process_alive(pid: &str) -> bool {
    std::process::Command::new("kill")
        .args(["-0", pid])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn test_timed_out_attempt_kills_child_process() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("child.pid");
    let repository = Arc::new(MemoryJobRepository::new());
    let orchestrator = orchestrator(
        ShellConverter {
            executor: ProcessExecutor::default(),
            script: r#"echo $$ > "$1"; exec sleep 30"#.to_string(),
            pid_file: pid_file.clone(),
        },
        &repository,
        Duration::from_millis(500),
    );

    let input = fixtures::write_input(dir.path(), "job.sh", b"#!/bin/sh\n").await;
    let job = repository
        .create(NewJob::new(&input, dir.path().join("job.out")))
        .unwrap();

    let start = Instant::now();
    let result = orchestrator.run(&job.id).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(result.status, JobStatus::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::Timeout));
    assert!(elapsed < Duration::from_secs(10), "elapsed {:?}", elapsed);

    let pid = tokio::fs::read_to_string(&pid_file).await.unwrap();
    assert!(!process_alive(pid.trim()), "child {} still running", pid.trim());
}

#[tokio::test]
async fn test_shell_converter_success_is_hashed() {
    let dir = TempDir::new().unwrap();
    let repository = Arc::new(MemoryJobRepository::new());
    let orchestrator = orchestrator(
        ShellConverter {
            executor: ProcessExecutor::default(),
            script: r#"echo $$ > "$1"; cat "$2" "$2" > "$3""#.to_string(),
            pid_file: dir.path().join("child.pid"),
        },
        &repository,
        Duration::from_secs(10),
    );

    let input = fixtures::write_input(dir.path(), "job.sh", b"twice\n").await;
    let job = repository
        .create(NewJob::new(&input, dir.path().join("job.out")))
        .unwrap();
    let result = orchestrator.run(&job.id).await.unwrap();

    assert!(result.is_completed());
    assert_eq!(result.output_size, Some(12));
    let bytes = tokio::fs::read(dir.path().join("job.out")).await.unwrap();
    assert_eq!(bytes, b"twice\ntwice\n");
}
