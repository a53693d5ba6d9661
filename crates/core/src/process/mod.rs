//! External process plumbing shared by every tool-backed converter.
//!
//! - [`ToolLocator`] answers "is this executable installed, and where?"
//! - [`ProcessExecutor`] runs one external command under a wall-clock
//!   timeout and always reaps the child before returning.
//!
//! The executor never retries; retry policy belongs to the orchestrator.
//!
//! # Example
//!
//! ```ignore
//! use docforge_core::process::{ExecOptions, ExecutorConfig, ProcessExecutor, ToolLocator};
//!
//! let executor = ProcessExecutor::new(ExecutorConfig::default());
//! let locator = ToolLocator::new(executor.clone(), Default::default());
//!
//! if let Some(ffmpeg) = locator.locate("ffmpeg").await {
//!     let outcome = executor
//!         .execute(&ffmpeg, &["-version".to_string()], &ExecOptions::with_timeout_secs(10))
//!         .await?;
//!     println!("exit code: {:?}", outcome.exit_code);
//! }
//! ```

mod config;
mod error;
mod executor;
mod locator;
mod types;

pub use config::ExecutorConfig;
pub use error::ExecutorError;
pub use executor::ProcessExecutor;
pub use locator::{ToolInfo, ToolLocator};
pub use types::{ExecOptions, ExecutionOutcome};
