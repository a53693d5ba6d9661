//! Scripted converter for testing the orchestrator.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::converter::{
    ConversionResult, ConvertOptions, Converter, ConverterDescriptor, ConverterInfo,
    DependencyStatus,
};

/// What the converter does on one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Write these bytes to the output and report success.
    Succeed(Vec<u8>),
    /// Report failure with this message.
    Fail(String),
    /// Panic with this message.
    Panic(String),
    /// Never finish, ignoring cancellation.
    Hang,
    /// Wait until the attempt is cancelled, then report failure.
    HangUntilCancelled,
    /// Report success without writing anything.
    SucceedWithoutOutput,
    /// Sleep, then perform the inner step.
    Delayed(Duration, Box<Step>),
}

/// A recorded call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub input: PathBuf,
    pub output: PathBuf,
    pub dry_run: bool,
    pub params: Map<String, Value>,
    /// When the call started.
    pub at: Instant,
}

/// Converter whose behaviour is scripted per call.
///
/// Each call pops the next [`Step`]; once the script is exhausted the
/// fallback step (failure by default) repeats. Clones share state, so a
/// test can keep one handle while the registry owns another.
///
/// # Example
///
/// ```rust,ignore
/// use docforge_core::testing::{ScriptedConverter, Step};
///
/// let converter = ScriptedConverter::new("flaky", &[".txt"])
///     .with_script(vec![Step::Fail("boom".into()), Step::Succeed(b"ok".to_vec())]);
///
/// // Register converter.descriptor(), run a job, then:
/// assert_eq!(converter.call_count().await, 2);
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedConverter {
    info: ConverterInfo,
    /// Steps still to play.
    steps: Arc<RwLock<VecDeque<Step>>>,
    /// Step used when the script is exhausted.
    fallback: Arc<RwLock<Step>>,
    /// Every call made so far.
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    /// Reported by `check_dependencies`.
    dependency: Arc<RwLock<DependencyStatus>>,
}

impl ScriptedConverter {
    /// Create a converter accepting the given extensions and producing `out`.
    pub fn new(id: &str, extensions: &[&str]) -> Self {
        Self {
            info: ConverterInfo::new(id, format!("Scripted {}", id))
                .inputs(extensions)
                .outputs(&["out"]),
            steps: Arc::new(RwLock::new(VecDeque::new())),
            fallback: Arc::new(RwLock::new(Step::Fail("script exhausted".to_string()))),
            calls: Arc::new(RwLock::new(Vec::new())),
            dependency: Arc::new(RwLock::new(DependencyStatus::builtin())),
        }
    }

    /// Replaces the script. Only valid before the converter is shared.
    pub fn with_script(self, steps: Vec<Step>) -> Self {
        Self {
            steps: Arc::new(RwLock::new(steps.into())),
            ..self
        }
    }

    /// Sets the step repeated after the script runs out.
    pub fn with_fallback(self, step: Step) -> Self {
        Self {
            fallback: Arc::new(RwLock::new(step)),
            ..self
        }
    }

    /// Declares the produced output types.
    pub fn with_outputs(mut self, outputs: &[&str]) -> Self {
        self.info = self.info.outputs(outputs);
        self
    }

    /// Declares required external tools.
    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.info = self.info.tools(tools);
        self
    }

    /// Wraps a clone into a registry descriptor.
    pub fn descriptor(&self) -> ConverterDescriptor {
        ConverterDescriptor::new(Arc::new(self.clone()))
    }

    /// Appends a step to the script.
    pub async fn push_step(&self, step: Step) {
        self.steps.write().await.push_back(step);
    }

    /// Sets the dependency status.
    pub async fn set_dependency_status(&self, status: DependencyStatus) {
        *self.dependency.write().await = status;
    }

    /// Get all recorded calls.
    pub async fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    /// Get the number of calls performed.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    async fn next_step(&self) -> Step {
        match self.steps.write().await.pop_front() {
            Some(step) => step,
            None => self.fallback.read().await.clone(),
        }
    }
}

async fn play(step: Step, output: &Path, options: &ConvertOptions) -> ConversionResult {
    let mut step = step;
    loop {
        match step {
            Step::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                step = *inner;
            }
            Step::Succeed(bytes) => {
                if let Some(parent) = output.parent() {
                    if let Err(e) = tokio::fs::create_dir_all(parent).await {
                        return ConversionResult::failed(e.to_string());
                    }
                }
                if let Err(e) = tokio::fs::write(output, &bytes).await {
                    return ConversionResult::failed(e.to_string());
                }
                let mut metadata = Map::new();
                metadata.insert("outputSize".to_string(), Value::from(bytes.len() as u64));
                return ConversionResult::ok(metadata);
            }
            Step::Fail(message) => return ConversionResult::failed(message),
            Step::Panic(message) => panic!("{}", message),
            Step::Hang => std::future::pending::<()>().await,
            Step::HangUntilCancelled => {
                options.cancel.cancelled().await;
                return ConversionResult::failed("cancelled");
            }
            Step::SucceedWithoutOutput => return ConversionResult::ok(Map::new()),
        }
    }
}

#[async_trait]
impl Converter for ScriptedConverter {
    fn info(&self) -> ConverterInfo {
        self.info.clone()
    }

    async fn convert(&self, input: &Path, output: &Path, options: &ConvertOptions) -> ConversionResult {
        self.calls.write().await.push(RecordedCall {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            dry_run: options.dry_run,
            params: options.params.clone(),
            at: Instant::now(),
        });
        let step = self.next_step().await;
        play(step, output, options).await
    }

    async fn check_dependencies(&self) -> DependencyStatus {
        self.dependency.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.bin");
        let converter = ScriptedConverter::new("s", &[".in"])
            .with_script(vec![Step::Fail("first".into()), Step::Succeed(b"data".to_vec())]);
        let options = ConvertOptions::default();

        let first = converter.convert(Path::new("a.in"), &output, &options).await;
        assert_eq!(first.errors, vec!["first"]);

        let second = converter.convert(Path::new("a.in"), &output, &options).await;
        assert!(second.success);
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"data");

        let third = converter.convert(Path::new("a.in"), &output, &options).await;
        assert_eq!(third.errors, vec!["script exhausted"]);
        assert_eq!(converter.call_count().await, 3);
    }

    #[tokio::test]
    async fn test_hang_until_cancelled() {
        let converter = ScriptedConverter::new("s", &[".in"])
            .with_script(vec![Step::HangUntilCancelled]);
        let options = ConvertOptions::default();
        let token = options.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let result = converter
            .convert(Path::new("a.in"), Path::new("unused"), &options)
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let converter = ScriptedConverter::new("s", &[".in"]);
        let descriptor = converter.descriptor();
        converter.push_step(Step::SucceedWithoutOutput).await;
        converter
            .set_dependency_status(DependencyStatus::missing("tool", "get it"))
            .await;

        let result = descriptor
            .convert(Path::new("a.in"), Path::new("b.out"), &ConvertOptions::default())
            .await;
        assert!(result.success);
        assert!(!descriptor.check_dependencies().await.installed);
        assert_eq!(converter.call_count().await, 1);
    }
}
