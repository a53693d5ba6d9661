//! In-memory job repository.

use chrono::{DateTime, Utc};
use serde_json::Map;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::store::{JobError, JobRepository};
use super::types::{Job, JobStatus, JobUpdate, NewJob};

/// Thread-safe repository that keeps jobs in a map.
#[derive(Debug, Default)]
pub struct MemoryJobRepository {
    jobs: RwLock<HashMap<String, Job>>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Result<Vec<Job>, JobError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    /// Inserts a job as-is. Used to seed fixtures with arbitrary state.
    pub fn insert(&self, job: Job) -> Result<(), JobError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        jobs.insert(job.id.clone(), job);
        Ok(())
    }
}

fn poisoned() -> JobError {
    JobError::Storage("job map lock poisoned".to_string())
}

impl JobRepository for MemoryJobRepository {
    fn create(&self, request: NewJob) -> Result<Job, JobError> {
        let id = request
            .id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        if jobs.contains_key(&id) {
            return Err(JobError::AlreadyExists(id));
        }
        let job = Job {
            id: id.clone(),
            input_path: request.input_path,
            output_path: request.output_path,
            converter_id: request.converter_id,
            options: request.options,
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
        };
        jobs.insert(id, job.clone());
        debug!(job_id = %job.id, "Job created");
        Ok(job)
    }

    fn get_by_id(&self, id: &str) -> Result<Option<Job>, JobError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(jobs.get(id).cloned())
    }

    fn update_status(&self, id: &str, status: JobStatus, update: JobUpdate) -> Result<Job, JobError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        if !job.status.can_transition_to(status) {
            return Err(JobError::InvalidTransition {
                job_id: id.to_string(),
                from: job.status,
                to: status,
            });
        }
        job.apply(status, update);
        Ok(job.clone())
    }

    fn compare_and_update(
        &self,
        id: &str,
        expected: JobStatus,
        status: JobStatus,
        update: JobUpdate,
    ) -> Result<Job, JobError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        if job.status != expected {
            return Err(JobError::StatusMismatch {
                job_id: id.to_string(),
                expected,
                actual: job.status,
            });
        }
        if !job.status.can_transition_to(status) {
            return Err(JobError::InvalidTransition {
                job_id: id.to_string(),
                from: job.status,
                to: status,
            });
        }
        job.apply(status, update);
        Ok(job.clone())
    }

    fn list_expirable(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>, JobError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        let mut expirable: Vec<Job> = jobs
            .values()
            .filter(|job| job.status.is_terminal())
            .filter(|job| job.completed_at.unwrap_or(job.created_at) <= cutoff)
            .cloned()
            .collect();
        expirable.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(expirable)
    }
}
