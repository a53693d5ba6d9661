//! Conversion orchestrator implementation.
//!
//! Drives one job through PENDING -> PROCESSING -> COMPLETED | FAILED:
//! validates the input, resolves a converter, runs bounded attempts with
//! exponential backoff, verifies and hashes the output, and records the
//! terminal state.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::converter::{
    extension_of, panic_message, ConvertOptions, ConverterDescriptor, ConverterRegistry,
};
use crate::job::{Job, JobError, JobRepository, JobStatus, JobUpdate};
use crate::metrics;

use super::backoff::backoff_delay;
use super::config::OrchestratorConfig;
use super::deadline::{run_with_deadline, DeadlineOutcome};
use super::types::{ConversionError, JobResult, OrchestratorError};

const HASH_CHUNK: usize = 64 * 1024;

/// Output of a successful attempt.
struct VerifiedOutput {
    hash: String,
    size: u64,
    metadata: Map<String, Value>,
}

/// Everything the terminal transition needs.
struct RunOutcome {
    attempt: u32,
    converter_id: Option<String>,
    result: Result<VerifiedOutput, ConversionError>,
    history: Vec<String>,
}

impl RunOutcome {
    fn early(error: ConversionError) -> Self {
        Self {
            attempt: 1,
            converter_id: None,
            history: vec![format!("attempt 1: {}", error)],
            result: Err(error),
        }
    }
}

/// Removes a job id from the in-flight set when dropped.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    job_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.job_id);
    }
}

/// Runs conversion jobs against a converter registry.
///
/// Many jobs may run concurrently on one orchestrator; a single job id is
/// never processed by two runs at once.
pub struct ConversionOrchestrator {
    registry: Arc<ConverterRegistry>,
    repository: Arc<dyn JobRepository>,
    config: OrchestratorConfig,
    in_flight: Mutex<HashSet<String>>,
}

impl ConversionOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        registry: Arc<ConverterRegistry>,
        repository: Arc<dyn JobRepository>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            repository,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    /// Runs a job to a terminal state.
    pub async fn run(&self, job_id: &str) -> Result<JobResult, OrchestratorError> {
        self.run_with_cancel(job_id, CancellationToken::new()).await
    }

    /// Runs a job, stopping early when `cancel` fires.
    ///
    /// A cancelled job ends FAILED with kind CANCELLED; any running
    /// conversion process is terminated before this returns.
    pub async fn run_with_cancel(
        &self,
        job_id: &str,
        cancel: CancellationToken,
    ) -> Result<JobResult, OrchestratorError> {
        let _guard = self
            .enter(job_id)
            .ok_or_else(|| OrchestratorError::AlreadyRunning(job_id.to_string()))?;

        let job = self
            .repository
            .get_by_id(job_id)?
            .ok_or_else(|| OrchestratorError::NotFound(job_id.to_string()))?;

        if job.status.is_finished() {
            debug!(job_id = %job.id, status = %job.status, "Job already finished, nothing to do");
            return Ok(JobResult::from(&job));
        }
        if job.status == JobStatus::Processing {
            return Err(OrchestratorError::AlreadyRunning(job_id.to_string()));
        }

        let started = Instant::now();
        let claim = self.repository.compare_and_update(
            job_id,
            JobStatus::Pending,
            JobStatus::Processing,
            JobUpdate::new().attempt(1).started_at(Utc::now()),
        );
        let job = match claim {
            Ok(job) => job,
            Err(JobError::StatusMismatch {
                actual: JobStatus::Processing,
                ..
            }) => return Err(OrchestratorError::AlreadyRunning(job_id.to_string())),
            Err(JobError::StatusMismatch { actual, .. }) if actual.is_finished() => {
                let job = self
                    .repository
                    .get_by_id(job_id)?
                    .ok_or_else(|| OrchestratorError::NotFound(job_id.to_string()))?;
                return Ok(JobResult::from(&job));
            }
            Err(e) => return Err(e.into()),
        };
        info!(job_id = %job.id, input = %job.input_path.display(), "Conversion job started");

        let outcome = self.drive(&job, &cancel).await;
        let finished = self.finish(&job, outcome, started)?;
        Ok(JobResult::from(&finished))
    }

    fn enter(&self, job_id: &str) -> Option<InFlightGuard<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(job_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            in_flight: &self.in_flight,
            job_id: job_id.to_string(),
        })
    }

    /// Validation, converter resolution and the retry loop.
    async fn drive(&self, job: &Job, cancel: &CancellationToken) -> RunOutcome {
        if let Err(e) = validate_input(&job.input_path).await {
            return RunOutcome::early(e);
        }
        if let Err(e) = ensure_distinct_output(&job.input_path, &job.output_path).await {
            return RunOutcome::early(e);
        }

        let descriptor = match self.resolve(job) {
            Ok(descriptor) => descriptor,
            Err(e) => return RunOutcome::early(e),
        };
        let converter_id = descriptor.id().to_string();

        if !self.config.dry_run {
            let status = descriptor.check_dependencies().await;
            if !status.installed {
                let mut outcome = RunOutcome::early(ConversionError::MissingDependency {
                    tool: status.tool,
                    message: status.message,
                });
                outcome.converter_id = Some(converter_id);
                return outcome;
            }
        }

        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut history = Vec::new();
        let mut attempt = 1;
        loop {
            debug!(job_id = %job.id, converter = %converter_id, attempt, "Starting attempt");
            let result = self.attempt(&descriptor, job, attempt, cancel).await;

            let error = match result {
                Ok(output) => {
                    metrics::ATTEMPTS_TOTAL
                        .with_label_values(&[converter_id.as_str(), "success"])
                        .inc();
                    return RunOutcome {
                        attempt,
                        converter_id: Some(converter_id),
                        result: Ok(output),
                        history,
                    };
                }
                Err(_) if cancel.is_cancelled() => ConversionError::Cancelled,
                Err(e) => e,
            };
            metrics::ATTEMPTS_TOTAL
                .with_label_values(&[converter_id.as_str(), error.kind().as_str()])
                .inc();
            history.push(format!("attempt {}: {}", attempt, error));

            if !error.is_retryable() || attempt >= max_attempts {
                return RunOutcome {
                    attempt,
                    converter_id: Some(converter_id),
                    result: Err(error),
                    history,
                };
            }

            let delay = backoff_delay(attempt, &self.config.retry);
            warn!(
                job_id = %job.id,
                converter = %converter_id,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Attempt failed, retrying"
            );
            metrics::RETRIES_TOTAL.inc();

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    history.push(format!("cancelled while waiting for attempt {}", attempt + 1));
                    return RunOutcome {
                        attempt,
                        converter_id: Some(converter_id),
                        result: Err(ConversionError::Cancelled),
                        history,
                    };
                }
            }

            attempt += 1;
            if let Err(e) = self.repository.update_status(
                &job.id,
                JobStatus::Processing,
                JobUpdate::new().attempt(attempt),
            ) {
                warn!(job_id = %job.id, attempt, error = %e, "Failed to persist attempt counter");
            }
        }
    }

    fn resolve(&self, job: &Job) -> Result<Arc<ConverterDescriptor>, ConversionError> {
        if let Some(id) = &job.converter_id {
            return self
                .registry
                .get(id)
                .ok_or_else(|| ConversionError::UnsupportedFormat(format!("Unknown converter: {}", id)));
        }

        let ext = extension_of(&job.input_path).ok_or_else(|| {
            ConversionError::UnsupportedFormat(format!(
                "Input file {} has no extension",
                job.input_path.display()
            ))
        })?;
        let output_ext = extension_of(&job.output_path);
        self.registry
            .find_for(&ext, output_ext.as_deref())
            .ok_or_else(|| ConversionError::UnsupportedFormat(format!("No converter accepts {} files", ext)))
    }

    /// One attempt: convert under the deadline, then verify and hash.
    async fn attempt(
        &self,
        descriptor: &Arc<ConverterDescriptor>,
        job: &Job,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<VerifiedOutput, ConversionError> {
        // Leftovers from a failed attempt must not be mistaken for this one's output.
        if attempt > 1 {
            remove_stale_output(&job.output_path).await;
        }

        let limit = self.config.timeout();
        let dry_run = self.config.dry_run;
        let outcome = run_with_deadline(limit, self.config.cleanup_grace(), cancel, |token| {
            let descriptor = Arc::clone(descriptor);
            let input = job.input_path.clone();
            let output = job.output_path.clone();
            let options = ConvertOptions {
                dry_run,
                tool_timeout: None,
                cancel: token,
                params: job.options.clone(),
            };
            async move {
                let converted = AssertUnwindSafe(descriptor.convert(&input, &output, &options))
                    .catch_unwind()
                    .await;
                match converted {
                    Ok(result) if result.success => {
                        verify_and_hash(&output)
                            .await
                            .map(|(hash, size)| VerifiedOutput {
                                hash,
                                size,
                                metadata: result.metadata,
                            })
                    }
                    Ok(result) => Err(ConversionError::ExecutionFailure(result.error_message())),
                    Err(payload) => Err(ConversionError::ExecutionFailure(format!(
                        "converter panicked: {}",
                        panic_message(payload.as_ref())
                    ))),
                }
            }
        })
        .await;

        match outcome {
            DeadlineOutcome::Completed(result) => result,
            DeadlineOutcome::TimedOut => Err(ConversionError::Timeout(limit.as_millis() as u64)),
            DeadlineOutcome::Cancelled => Err(ConversionError::Cancelled),
        }
    }

    /// Records the terminal state.
    fn finish(&self, job: &Job, outcome: RunOutcome, started: Instant) -> Result<Job, OrchestratorError> {
        let duration_ms = started.elapsed().as_millis() as u64;
        let converter_label = outcome.converter_id.clone().unwrap_or_else(|| "none".to_string());

        let mut update = JobUpdate::new()
            .attempt(outcome.attempt)
            .completed_at(Utc::now())
            .duration_ms(duration_ms);
        if let Some(id) = &outcome.converter_id {
            update = update.converter(id.clone());
        }

        let (status, update) = match outcome.result {
            Ok(output) => {
                info!(
                    job_id = %job.id,
                    converter = %converter_label,
                    attempt = outcome.attempt,
                    output_size = output.size,
                    duration_ms,
                    "Conversion job completed"
                );
                (
                    JobStatus::Completed,
                    update.output(output.hash, output.size, output.metadata),
                )
            }
            Err(e) => {
                let mut stack = e.render_chain();
                if outcome.history.len() > 1 {
                    stack.push_str("\nattempts:");
                    for line in &outcome.history {
                        stack.push_str("\n  ");
                        stack.push_str(line);
                    }
                }
                error!(
                    job_id = %job.id,
                    converter = %converter_label,
                    attempt = outcome.attempt,
                    kind = %e.kind(),
                    error = %e,
                    duration_ms,
                    "Conversion job failed"
                );
                (
                    JobStatus::Failed,
                    update.error(e.kind(), e.to_string(), Some(stack)),
                )
            }
        };

        let result_label = if status == JobStatus::Completed { "completed" } else { "failed" };
        metrics::JOBS_TOTAL
            .with_label_values(&[converter_label.as_str(), result_label])
            .inc();
        metrics::JOB_DURATION
            .with_label_values(&[result_label])
            .observe(duration_ms as f64 / 1000.0);

        Ok(self.repository.update_status(&job.id, status, update)?)
    }
}

/// The input must be an existing, non-empty regular file.
async fn validate_input(path: &Path) -> Result<(), ConversionError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if !meta.is_file() => Err(ConversionError::InvalidInput(format!(
            "Input {} is not a regular file",
            path.display()
        ))),
        Ok(meta) if meta.len() == 0 => Err(ConversionError::InvalidInput(format!(
            "Input file {} is empty",
            path.display()
        ))),
        Ok(_) => Ok(()),
        Err(_) => Err(ConversionError::InvalidInput(format!(
            "Input file not found: {}",
            path.display()
        ))),
    }
}

/// Rejects a job whose output path resolves to its input file.
async fn ensure_distinct_output(input: &Path, output: &Path) -> Result<(), ConversionError> {
    let Ok(input_real) = tokio::fs::canonicalize(input).await else {
        return Ok(());
    };
    let output_real = match tokio::fs::canonicalize(output).await {
        Ok(real) => real,
        Err(_) => {
            let parent = match output.parent() {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => Path::new("."),
            };
            match (tokio::fs::canonicalize(parent).await, output.file_name()) {
                (Ok(dir), Some(name)) => dir.join(name),
                _ => return Ok(()),
            }
        }
    };
    if output_real == input_real {
        return Err(ConversionError::InvalidInput(format!(
            "Output path {} is the input file",
            output.display()
        )));
    }
    Ok(())
}

/// Deletes output left by an earlier attempt so verification only sees
/// what the current attempt wrote.
async fn remove_stale_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed output from previous attempt"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale output"),
    }
}

/// Checks the output exists and is non-empty, then streams it through SHA-256.
async fn verify_and_hash(path: &Path) -> Result<(String, u64), ConversionError> {
    let meta = tokio::fs::metadata(path).await.map_err(|_| {
        ConversionError::OutputNotCreated(format!(
            "Converter reported success but {} does not exist",
            path.display()
        ))
    })?;
    if !meta.is_file() || meta.len() == 0 {
        return Err(ConversionError::OutputNotCreated(format!(
            "Converter reported success but {} is empty",
            path.display()
        )));
    }

    let unreadable = |source| ConversionError::OutputUnreadable {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::open(path).await.map_err(unreadable)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).await.map_err(unreadable)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}
