//! Expiry sweep integration tests.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tempfile::TempDir;

use docforge_core::{
    testing::{fixtures, ScriptedConverter, Step},
    ConversionOrchestrator, ExpirySweeper, JobRepository, JobStatus, MemoryJobRepository, NewJob,
    SweepConfig,
};

struct SweepHarness {
    repository: Arc<MemoryJobRepository>,
    orchestrator: ConversionOrchestrator,
    temp_dir: TempDir,
}

impl SweepHarness {
    fn new() -> Self {
        let converter = ScriptedConverter::new("txt", &[".txt"])
            .with_script(vec![Step::Succeed(b"converted".to_vec())])
            .with_fallback(Step::Fail("broken".into()));
        let repository = Arc::new(MemoryJobRepository::new());
        let orchestrator = ConversionOrchestrator::new(
            fixtures::registry(&[&converter]),
            Arc::clone(&repository) as Arc<dyn JobRepository>,
            fixtures::fast_config(),
        );
        Self {
            repository,
            orchestrator,
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn sweeper(&self, config: SweepConfig) -> ExpirySweeper {
        ExpirySweeper::new(
            Arc::clone(&self.repository) as Arc<dyn JobRepository>,
            config,
        )
    }

    async fn job(&self, name: &str) -> String {
        let input = fixtures::write_input(self.temp_dir.path(), &format!("{}.txt", name), b"hello").await;
        self.repository
            .create(NewJob::new(input, self.temp_dir.path().join(format!("{}.out", name))))
            .unwrap()
            .id
    }

    fn status(&self, id: &str) -> JobStatus {
        self.repository.get_by_id(id).unwrap().unwrap().status
    }
}

#[tokio::test]
async fn test_only_old_terminal_jobs_expire() {
    let harness = SweepHarness::new();

    let completed = harness.job("completed").await;
    harness.orchestrator.run(&completed).await.unwrap();
    let failed = harness.job("failed").await;
    harness.orchestrator.run(&failed).await.unwrap();
    let pending = harness.job("pending").await;

    assert_eq!(harness.status(&completed), JobStatus::Completed);
    assert_eq!(harness.status(&failed), JobStatus::Failed);

    let sweeper = harness.sweeper(SweepConfig::default());

    // Within the retention window nothing changes.
    let report = sweeper.sweep_once(Utc::now()).await.unwrap();
    assert!(report.expired.is_empty());

    let later = Utc::now() + ChronoDuration::hours(169);
    let report = sweeper.sweep_once(later).await.unwrap();

    let mut expected = vec![completed.clone(), failed.clone()];
    expected.sort();
    assert_eq!(report.expired, expected);
    assert!(report.errors.is_empty());

    assert_eq!(harness.status(&completed), JobStatus::Expired);
    assert_eq!(harness.status(&failed), JobStatus::Expired);
    assert_eq!(harness.status(&pending), JobStatus::Pending);

    // Both inputs plus the one output that was written.
    assert_eq!(report.files_removed, 3);
    assert!(!harness.temp_dir.path().join("completed.out").exists());
    assert!(!harness.temp_dir.path().join("completed.txt").exists());
    assert!(harness.temp_dir.path().join("pending.txt").exists());

    // Expired jobs are not swept again.
    let report = sweeper.sweep_once(later).await.unwrap();
    assert!(report.expired.is_empty());
}

#[tokio::test]
async fn test_sweep_can_keep_artifacts() {
    let harness = SweepHarness::new();
    let completed = harness.job("kept").await;
    harness.orchestrator.run(&completed).await.unwrap();

    let sweeper = harness.sweeper(SweepConfig {
        retention_hours: 1,
        remove_artifacts: false,
        ..Default::default()
    });
    let report = sweeper
        .sweep_once(Utc::now() + ChronoDuration::hours(2))
        .await
        .unwrap();

    assert_eq!(report.expired, vec![completed.clone()]);
    assert_eq!(report.files_removed, 0);
    assert!(harness.temp_dir.path().join("kept.out").exists());
    assert!(harness.temp_dir.path().join("kept.txt").exists());
}

#[tokio::test]
async fn test_expired_job_is_not_rerun() {
    let harness = SweepHarness::new();
    let completed = harness.job("done").await;
    let first = harness.orchestrator.run(&completed).await.unwrap();

    harness
        .sweeper(SweepConfig::default())
        .sweep_once(Utc::now() + ChronoDuration::days(30))
        .await
        .unwrap();

    let again = harness.orchestrator.run(&completed).await.unwrap();
    assert_eq!(again.status, JobStatus::Expired);
    assert_eq!(again.output_hash, first.output_hash);
    assert_eq!(again.progress, 0);
}
