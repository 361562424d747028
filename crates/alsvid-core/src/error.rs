//! Error types for the core scheduling model.

use thiserror::Error;

use crate::job::JobId;
use crate::node::NodeIndex;

/// Errors that can occur in core table operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Job not found in the job table.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// Node not found in the node table.
    #[error("node not found: {0}")]
    NodeNotFound(NodeIndex),

    /// A sync-dependency peer cannot be combined for scheduling.
    #[error("job {job} cannot combine with sync peer {peer}")]
    SyncCombine {
        /// The job requiring combination.
        job: JobId,
        /// The peer that blocked it.
        peer: JobId,
    },

    /// Node allocation rejected by the resource manager.
    #[error("allocation failed for job {job}: {reason}")]
    AllocationFailed {
        /// The job being allocated.
        job: JobId,
        /// Resource-manager supplied reason.
        reason: String,
    },

    /// Job start rejected by the resource manager.
    #[error("start failed for job {job}: {reason}")]
    StartFailed {
        /// The job being started.
        job: JobId,
        /// Resource-manager supplied reason.
        reason: String,
    },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
