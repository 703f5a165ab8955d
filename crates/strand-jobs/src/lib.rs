//! # strand-jobs
//!
//! Dependency-graph job scheduler for Strand.
//!
//! Jobs and sync points form a DAG. A job runs on a worker thread once all of
//! its prerequisites have fired and its owner has scheduled it; ready jobs
//! are dispatched by priority into per-worker transaction queues.
//!
//! Features:
//! - Dependency counting with one-shot edges
//! - Priority dispatch with round-robin worker selection
//! - Sync points and per-job completion events
//! - Auto-destroyed fire-and-forget jobs
//! - Inline mode (zero workers) for deterministic execution
//!
//! ## Example
//!
//! ```
//! use strand_jobs::{JobConfig, JobManager, JobOptions};
//!
//! let manager = JobManager::new(JobConfig::inline()).unwrap();
//! let load = manager.create_fn_job("load", || {}, JobOptions::new()).unwrap();
//! let parse = manager
//!     .create_fn_job("parse", || {}, JobOptions::new().with_sync())
//!     .unwrap();
//! manager.add_dependency(load, parse).unwrap();
//! manager.schedule(parse).unwrap();
//! manager.schedule(load).unwrap();
//! manager.sync(parse).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod entry;
mod error;
mod manager;
mod payload;
mod worker;

pub use config::{JobConfig, DEFAULT_QUEUE_CAPACITY};
pub use entry::{EntryId, JobOptions, JobPriority};
pub use error::{JobError, JobResult};
pub use manager::JobManager;
pub use payload::{FnJob, JobPayload};
