//! Conversion jobs: the data model, its state machine and storage.

mod memory;
mod store;
mod types;

pub use memory::MemoryJobRepository;
pub use store::{JobError, JobRepository};
pub use types::{ErrorKind, Job, JobStatus, JobUpdate, NewJob};
