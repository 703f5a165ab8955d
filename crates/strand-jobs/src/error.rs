//! Error types for the job system

use crate::EntryId;
use thiserror::Error;

/// Job system errors
///
/// Broken invariants (negative dependency counts, double scheduling, syncing
/// an entry without a completion event) are not represented here, they panic.
#[derive(Debug, Error)]
pub enum JobError {
    /// Handle refers to an entry that was destroyed and possibly recycled
    #[error("stale entry handle {0:?}")]
    StaleHandle(EntryId),

    /// Manager has been shut down
    #[error("job manager is shut down")]
    ShutDown,

    /// Configuration rejected at construction
    #[error("invalid job configuration: {0}")]
    InvalidConfig(String),

    /// Worker or scheduler thread could not be started
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Result type for job system operations
pub type JobResult<T> = Result<T, JobError>;
