//! Retention sweep that expires old terminal jobs.
//!
//! Runs separately from the orchestrator: terminal jobs that finished more
//! than `retention_hours` ago lose their artifacts and become EXPIRED.

mod config;
mod sweeper;

pub use config::SweepConfig;
pub use sweeper::{ExpirySweeper, SweepReport};
