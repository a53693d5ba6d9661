//! Job repository trait.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{Job, JobStatus, JobUpdate, NewJob};

/// Errors raised by job repositories.
#[derive(Debug, Error)]
pub enum JobError {
    /// Job not found.
    #[error("job not found: {0}")]
    NotFound(String),

    /// A job with this id already exists.
    #[error("job already exists: {0}")]
    AlreadyExists(String),

    /// Transition not allowed by the state machine.
    #[error("cannot move job {job_id} from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    /// The job was not in the status the caller expected.
    #[error("job {job_id} is {actual}, expected {expected}")]
    StatusMismatch {
        job_id: String,
        expected: JobStatus,
        actual: JobStatus,
    },

    /// Backend failure.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Persistence for conversion jobs.
///
/// Implementations must reject transitions that
/// [`JobStatus::can_transition_to`] forbids, so a terminal job can only
/// ever become EXPIRED.
pub trait JobRepository: Send + Sync {
    /// Creates a job in PENDING state.
    fn create(&self, request: NewJob) -> Result<Job, JobError>;

    /// Gets a job by id.
    fn get_by_id(&self, id: &str) -> Result<Option<Job>, JobError>;

    /// Moves a job to `status`, applying `update`, and returns the new job.
    fn update_status(&self, id: &str, status: JobStatus, update: JobUpdate) -> Result<Job, JobError>;

    /// Like [`update_status`](Self::update_status), but only when the job is
    /// currently in `expected`. The check and the write happen atomically.
    fn compare_and_update(
        &self,
        id: &str,
        expected: JobStatus,
        status: JobStatus,
        update: JobUpdate,
    ) -> Result<Job, JobError>;

    /// Terminal jobs that finished at or before `cutoff`.
    fn list_expirable(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>, JobError>;
}
