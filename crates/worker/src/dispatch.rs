//! Turns files into jobs and runs them against one shared repository.

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use docforge_core::{
    ConversionOrchestrator, ConverterRegistry, JobRepository, JobResult, MemoryJobRepository,
    NewJob, OrchestratorConfig,
};

use crate::paths::{default_output_path, output_extension};

/// One file to convert.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub input: PathBuf,
    /// Chosen by input extension when absent.
    pub converter: Option<String>,
    /// Timestamped file in the output directory when absent.
    pub output: Option<PathBuf>,
    pub params: Map<String, Value>,
}

impl Submission {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }
}

/// Creates jobs and runs them to a terminal state.
pub struct Dispatcher {
    registry: Arc<ConverterRegistry>,
    repository: Arc<MemoryJobRepository>,
    orchestrator: ConversionOrchestrator,
    output_dir: PathBuf,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ConverterRegistry>,
        repository: Arc<MemoryJobRepository>,
        config: OrchestratorConfig,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let orchestrator = ConversionOrchestrator::new(
            Arc::clone(&registry),
            Arc::clone(&repository) as Arc<dyn JobRepository>,
            config,
        );
        Self {
            registry,
            repository,
            orchestrator,
            output_dir: output_dir.into(),
        }
    }

    pub fn repository(&self) -> &Arc<MemoryJobRepository> {
        &self.repository
    }

    /// Records a job for `submission` and runs it.
    ///
    /// Input problems (missing, empty, unsupported) come back as a FAILED
    /// [`JobResult`]; only repository and filesystem setup errors are `Err`.
    pub async fn submit(&self, submission: Submission, cancel: CancellationToken) -> Result<JobResult> {
        let Submission {
            input,
            converter,
            output,
            params,
        } = submission;

        let output = match output {
            Some(path) => path,
            None => {
                let ext = output_extension(&self.registry, &input, converter.as_deref());
                default_output_path(&self.output_dir, &input, &ext, Utc::now())
            }
        };
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
        }

        let mut request = NewJob::new(&input, &output).with_options(params);
        if let Some(id) = converter {
            request = request.with_converter(id);
        }
        let job = self.repository.create(request).context("Failed to create job")?;
        debug!(job_id = %job.id, input = %input.display(), output = %output.display(), "Job submitted");

        self.orchestrator
            .run_with_cancel(&job.id, cancel)
            .await
            .context("Conversion job could not be run")
    }
}
