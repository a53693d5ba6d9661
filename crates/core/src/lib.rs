pub mod config;
pub mod converter;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod process;
pub mod sweep;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, load_env_config, validate_config, Config, ConfigError,
    StorageConfig,
};
pub use converter::{
    adapt_legacy, builtin_registry, ConversionResult, ConvertOptions, Converter, ConverterConfig,
    ConverterDescriptor, ConverterInfo, ConverterRegistry, ConverterRegistryBuilder,
    DependencyStatus, LegacyModule,
};
pub use job::{
    ErrorKind, Job, JobError, JobRepository, JobStatus, JobUpdate, MemoryJobRepository, NewJob,
};
pub use orchestrator::{
    ConversionError, ConversionOrchestrator, JobResult, OrchestratorConfig, OrchestratorError,
    RetryConfig,
};
pub use process::{ExecOptions, ExecutionOutcome, ExecutorConfig, ProcessExecutor, ToolLocator};
pub use sweep::{ExpirySweeper, SweepConfig, SweepReport};
