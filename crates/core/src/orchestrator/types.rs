//! Types for the conversion orchestrator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error as StdError;
use std::path::PathBuf;
use thiserror::Error;

use crate::job::{ErrorKind, Job, JobError, JobStatus};

/// Errors that are not job outcomes.
///
/// Every conversion failure ends as a FAILED [`JobResult`]; these only cover
/// cases where the orchestrator could not take ownership of the job at all.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Job not found.
    #[error("job not found: {0}")]
    NotFound(String),

    /// The job is already being processed.
    #[error("job {0} is already being processed")]
    AlreadyRunning(String),

    /// Job repository error.
    #[error("job repository error: {0}")]
    Repository(#[from] JobError),
}

/// Why a single attempt, or the whole job, failed.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    UnsupportedFormat(String),

    #[error("{message}")]
    MissingDependency { tool: String, message: String },

    #[error("{0}")]
    ExecutionFailure(String),

    #[error("attempt timed out after {0} ms")]
    Timeout(u64),

    #[error("{0}")]
    OutputNotCreated(String),

    #[error("failed to read output {}", path.display())]
    OutputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("job was cancelled")]
    Cancelled,
}

impl ConversionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversionError::InvalidInput(_) => ErrorKind::InvalidInput,
            ConversionError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ConversionError::MissingDependency { .. } => ErrorKind::MissingDependency,
            ConversionError::ExecutionFailure(_) | ConversionError::OutputUnreadable { .. } => {
                ErrorKind::ExecutionFailure
            }
            ConversionError::Timeout(_) => ErrorKind::Timeout,
            ConversionError::OutputNotCreated(_) => ErrorKind::OutputNotCreated,
            ConversionError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// The error followed by its source chain, one cause per line.
    pub fn render_chain(&self) -> String {
        let mut rendered = format!("{}: {}", self.kind(), self);
        let mut source = self.source();
        while let Some(cause) = source {
            rendered.push_str("\n  caused by: ");
            rendered.push_str(&cause.to_string());
            source = cause.source();
        }
        rendered
    }
}

/// Result envelope returned by every orchestrator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    pub attempt: u32,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converter_id: Option<String>,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl JobResult {
    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

impl From<&Job> for JobResult {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            attempt: job.attempt,
            progress: job.progress_percent(),
            converter_id: job.converter_id.clone(),
            input_path: job.input_path.clone(),
            output_path: job.output_path.clone(),
            output_hash: job.output_hash.clone(),
            output_size: job.output_size,
            duration_ms: job.duration_ms,
            error_kind: job.error_kind,
            error_message: job.error_message.clone(),
            metadata: job.metadata.clone(),
        }
    }
}
