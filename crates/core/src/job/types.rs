//! Job model and status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle status of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Expired,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Expired => "EXPIRED",
        }
    }

    /// Completed or failed. Expired jobs are also finished but were
    /// terminal before the sweep touched them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// True if no orchestrator run may ever touch the job again.
    pub fn is_finished(&self) -> bool {
        self.is_terminal() || *self == JobStatus::Expired
    }

    /// Allowed transitions. `Processing -> Processing` is a retry.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Expired)
                | (Failed, Expired)
        )
    }

    /// Coarse progress shown to users.
    pub fn progress_percent(&self) -> u8 {
        match self {
            JobStatus::Pending => 10,
            JobStatus::Processing => 50,
            JobStatus::Completed => 100,
            JobStatus::Failed | JobStatus::Expired => 0,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidInput,
    UnsupportedFormat,
    MissingDependency,
    ExecutionFailure,
    Timeout,
    OutputNotCreated,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorKind::MissingDependency => "MISSING_DEPENDENCY",
            ErrorKind::ExecutionFailure => "EXECUTION_FAILURE",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::OutputNotCreated => "OUTPUT_NOT_CREATED",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::ExecutionFailure | ErrorKind::Timeout | ErrorKind::OutputNotCreated
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conversion job as stored by the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Converter to use. When absent the input extension decides, and the
    /// resolved id is recorded once the job finishes.
    pub converter_id: Option<String>,
    /// Converter parameters.
    #[serde(default)]
    pub options: Map<String, Value>,
    pub status: JobStatus,
    /// Attempts started so far (0 until the first run).
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub error_stack: Option<String>,
    /// Hex SHA-256 of the output, set on completion.
    pub output_hash: Option<String>,
    pub output_size: Option<u64>,
    pub duration_ms: Option<u64>,
    /// Metadata reported by the converter on success.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Job {
    pub fn progress_percent(&self) -> u8 {
        self.status.progress_percent()
    }

    /// Applies a transition and its field changes.
    ///
    /// Error fields only survive on failed jobs and output fields only on
    /// completed ones; expiry keeps whatever the terminal state recorded.
    pub(crate) fn apply(&mut self, status: JobStatus, update: JobUpdate) {
        self.status = status;
        if let Some(attempt) = update.attempt {
            self.attempt = attempt;
        }
        if update.converter_id.is_some() {
            self.converter_id = update.converter_id;
        }
        if update.started_at.is_some() {
            self.started_at = update.started_at;
        }
        if update.completed_at.is_some() {
            self.completed_at = update.completed_at;
        }
        if update.duration_ms.is_some() {
            self.duration_ms = update.duration_ms;
        }
        match status {
            JobStatus::Completed => {
                self.output_hash = update.output_hash;
                self.output_size = update.output_size;
                self.metadata = update.metadata.unwrap_or_default();
                self.clear_error();
            }
            JobStatus::Failed => {
                self.error_kind = update.error_kind;
                self.error_message = update.error_message;
                self.error_stack = update.error_stack;
                self.output_hash = None;
                self.output_size = None;
            }
            JobStatus::Pending | JobStatus::Processing => {
                self.clear_error();
                self.output_hash = None;
                self.output_size = None;
            }
            JobStatus::Expired => {}
        }
    }

    fn clear_error(&mut self) {
        self.error_kind = None;
        self.error_message = None;
        self.error_stack = None;
    }
}

/// Request to create a job in PENDING state.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Explicit id; a UUID is generated when absent.
    pub id: Option<String>,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub converter_id: Option<String>,
    pub options: Map<String, Value>,
}

impl NewJob {
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            id: None,
            input_path: input_path.into(),
            output_path: output_path.into(),
            converter_id: None,
            options: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_converter(mut self, converter_id: impl Into<String>) -> Self {
        self.converter_id = Some(converter_id.into());
        self
    }

    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = options;
        self
    }
}

/// Field changes that accompany a status transition.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub attempt: Option<u32>,
    pub converter_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub error_stack: Option<String>,
    pub output_hash: Option<String>,
    pub output_size: Option<u64>,
    pub duration_ms: Option<u64>,
    pub metadata: Option<Map<String, Value>>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn converter(mut self, converter_id: impl Into<String>) -> Self {
        self.converter_id = Some(converter_id.into());
        self
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    /// Failure details.
    pub fn error(mut self, kind: ErrorKind, message: impl Into<String>, stack: Option<String>) -> Self {
        self.error_kind = Some(kind);
        self.error_message = Some(message.into());
        self.error_stack = stack;
        self
    }

    /// Output details for a completed job.
    pub fn output(mut self, hash: impl Into<String>, size: u64, metadata: Map<String, Value>) -> Self {
        self.output_hash = Some(hash.into());
        self.output_size = Some(size);
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job {
            id: "j1".to_string(),
            input_path: PathBuf::from("in.json"),
            output_path: PathBuf::from("out.csv"),
            converter_id: None,
            options: Map::new(),
            status: JobStatus::Pending,
            attempt: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_kind: None,
            error_message: None,
            error_stack: None,
            output_hash: None,
            output_size: None,
            duration_ms: None,
            metadata: Map::new(),
        }
    }

    #[test]
    fn test_transition_table() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Completed.can_transition_to(Expired));
        assert!(Failed.can_transition_to(Expired));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Expired.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Expired));
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(JobStatus::Pending.progress_percent(), 10);
        assert_eq!(JobStatus::Processing.progress_percent(), 50);
        assert_eq!(JobStatus::Completed.progress_percent(), 100);
        assert_eq!(JobStatus::Failed.progress_percent(), 0);
    }

    #[test]
    fn test_serialized_names() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"PROCESSING\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::OutputNotCreated).unwrap(),
            "\"OUTPUT_NOT_CREATED\""
        );
        assert_eq!(ErrorKind::MissingDependency.to_string(), "MISSING_DEPENDENCY");
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::ExecutionFailure.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::OutputNotCreated.is_retryable());
        assert!(!ErrorKind::InvalidInput.is_retryable());
        assert!(!ErrorKind::UnsupportedFormat.is_retryable());
        assert!(!ErrorKind::MissingDependency.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
    }

    #[test]
    fn test_apply_keeps_fields_consistent() {
        let mut job = job();
        job.apply(JobStatus::Processing, JobUpdate::new().attempt(1));
        job.apply(
            JobStatus::Failed,
            JobUpdate::new().error(ErrorKind::Timeout, "too slow", None),
        );
        assert_eq!(job.error_kind, Some(ErrorKind::Timeout));
        assert!(job.output_hash.is_none());

        job.apply(JobStatus::Expired, JobUpdate::new());
        assert_eq!(job.error_message.as_deref(), Some("too slow"));

        let mut done = self::job();
        done.apply(
            JobStatus::Completed,
            JobUpdate::new().output("abc", 3, Map::new()),
        );
        assert_eq!(done.output_hash.as_deref(), Some("abc"));
        assert!(done.error_message.is_none());
    }
}
