//! Expiry sweeper implementation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::job::{JobError, JobRepository, JobStatus, JobUpdate};
use crate::metrics;

use super::config::SweepConfig;

/// What one sweep pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Ids of jobs moved to EXPIRED.
    pub expired: Vec<String>,
    /// Artifact files deleted.
    pub files_removed: usize,
    /// Per-job problems that did not stop the pass.
    pub errors: Vec<String>,
}

/// Expires terminal jobs older than the retention window.
pub struct ExpirySweeper {
    repository: Arc<dyn JobRepository>,
    config: SweepConfig,
}

impl ExpirySweeper {
    pub fn new(repository: Arc<dyn JobRepository>, config: SweepConfig) -> Self {
        Self { repository, config }
    }

    /// Runs one pass with `now` as the reference time.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport, JobError> {
        let mut report = SweepReport::default();
        let Some(cutoff) = chrono::Duration::from_std(self.config.retention())
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
        else {
            return Ok(report);
        };

        let jobs = self.repository.list_expirable(cutoff)?;
        debug!(candidates = jobs.len(), cutoff = %cutoff, "Sweeping expired jobs");

        for job in jobs {
            if self.config.remove_artifacts {
                for path in [&job.output_path, &job.input_path] {
                    match remove_artifact(path).await {
                        Ok(true) => report.files_removed += 1,
                        Ok(false) => {}
                        Err(e) => {
                            warn!(job_id = %job.id, path = %path.display(), error = %e, "Failed to remove artifact");
                            report
                                .errors
                                .push(format!("{}: {}: {}", job.id, path.display(), e));
                        }
                    }
                }
            }

            match self
                .repository
                .update_status(&job.id, JobStatus::Expired, JobUpdate::new())
            {
                Ok(_) => {
                    metrics::JOBS_EXPIRED.inc();
                    report.expired.push(job.id);
                }
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Failed to expire job");
                    report.errors.push(format!("{}: {}", job.id, e));
                }
            }
        }

        if !report.expired.is_empty() {
            info!(
                expired = report.expired.len(),
                files_removed = report.files_removed,
                "Expired old conversion jobs"
            );
        }
        Ok(report)
    }

    /// Sweeps every `interval` until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_secs = self.config.interval_secs,
            retention_hours = self.config.retention_hours,
            "Starting expiry sweeper"
        );
        loop {
            if let Err(e) = self.sweep_once(Utc::now()).await {
                error!(error = %e, "Expiry sweep failed");
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval()) => {}
            }
        }
        info!("Expiry sweeper stopped");
    }
}

/// Deletes a file, returning whether it existed.
async fn remove_artifact(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
