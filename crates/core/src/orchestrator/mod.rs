//! Conversion orchestrator.
//!
//! Takes a PENDING job and drives it to COMPLETED or FAILED with bounded
//! retries, exponential backoff, a per-attempt deadline, output
//! verification and SHA-256 hashing.

mod backoff;
mod config;
mod deadline;
mod runner;
mod types;

pub use backoff::{backoff, backoff_delay};
pub use config::{OrchestratorConfig, RetryConfig};
pub use deadline::{run_with_deadline, DeadlineOutcome};
pub use runner::ConversionOrchestrator;
pub use types::{ConversionError, JobResult, OrchestratorError};
