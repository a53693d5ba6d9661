//! Long-running mode: convert files dropped into an inbox directory and
//! expire old jobs, both against the same job repository.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use docforge_core::{ExpirySweeper, JobRepository, JobResult, SweepConfig};

use crate::dispatch::{Dispatcher, Submission};

/// Polls an inbox and runs every new file as a conversion job.
pub struct InboxWatcher {
    inbox: PathBuf,
    poll_interval: Duration,
    dispatcher: Dispatcher,
    sweeper: ExpirySweeper,
    /// Paths already submitted, plus outputs we wrote.
    seen: Mutex<HashSet<PathBuf>>,
}

impl InboxWatcher {
    pub fn new(
        inbox: impl Into<PathBuf>,
        poll_interval: Duration,
        dispatcher: Dispatcher,
        sweep: SweepConfig,
    ) -> Self {
        let repository = Arc::clone(dispatcher.repository()) as Arc<dyn JobRepository>;
        Self {
            inbox: inbox.into(),
            poll_interval,
            dispatcher,
            sweeper: ExpirySweeper::new(repository, sweep),
            seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The sweeper expiring jobs this watcher ran.
    pub fn sweeper(&self) -> &ExpirySweeper {
        &self.sweeper
    }

    /// Submits every new regular file in the inbox and waits for the jobs.
    ///
    /// Hidden files are skipped. Files are submitted in name order and run
    /// concurrently.
    pub async fn scan_once(&self, cancel: &CancellationToken) -> Result<Vec<JobResult>> {
        let present = list_candidates(&self.inbox)
            .await
            .with_context(|| format!("Failed to read inbox {}", self.inbox.display()))?;

        let fresh: Vec<PathBuf> = {
            let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
            // Forget files that are gone so a new file with the same name is picked up.
            seen.retain(|path| present.contains(path) || !path.starts_with(&self.inbox));
            present
                .iter()
                .filter(|path| seen.insert((*path).clone()))
                .cloned()
                .collect()
        };
        if fresh.is_empty() {
            return Ok(Vec::new());
        }
        info!(count = fresh.len(), inbox = %self.inbox.display(), "Picked up new files");

        let runs = fresh.into_iter().map(|input| {
            let cancel = cancel.child_token();
            async move {
                let outcome = self.dispatcher.submit(Submission::new(&input), cancel).await;
                (input, outcome)
            }
        });

        let mut results = Vec::new();
        for (input, outcome) in futures::future::join_all(runs).await {
            match outcome {
                Ok(result) => {
                    self.seen
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(result.output_path.clone());
                    results.push(result);
                }
                Err(e) => warn!(input = %input.display(), error = %format!("{:#}", e), "Job could not be run"),
            }
        }
        Ok(results)
    }

    /// Polls the inbox and sweeps expired jobs until `cancel` fires.
    ///
    /// Each finished job is printed to stdout as one JSON line.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        tokio::fs::create_dir_all(&self.inbox)
            .await
            .with_context(|| format!("Failed to create inbox {}", self.inbox.display()))?;
        info!(
            inbox = %self.inbox.display(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Watching inbox"
        );

        let polling = async {
            loop {
                match self.scan_once(&cancel).await {
                    Ok(results) => {
                        for result in results {
                            match serde_json::to_string(&result) {
                                Ok(line) => println!("{}", line),
                                Err(e) => warn!(job_id = %result.job_id, error = %e, "Failed to encode job result"),
                            }
                        }
                    }
                    Err(e) => warn!(error = %format!("{:#}", e), "Inbox scan failed"),
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        };

        tokio::join!(polling, self.sweeper.run(cancel.clone()));
        info!("Inbox watcher stopped");
        Ok(())
    }
}

/// Visible regular files directly under `dir`, sorted by path.
async fn list_candidates(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden || !entry.file_type().await?.is_file() {
            continue;
        }
        files.push(entry.path());
    }
    files.sort();
    Ok(files)
}
