//! Error types for the backfill engine.

use thiserror::Error;

use alsvid_core::CoreError;

/// Errors that can occur while running a backfill pass.
///
/// Per-job infeasibility is never an error — strategies recover locally by
/// skipping the job. Errors are reserved for structural setup problems.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackfillError {
    /// The window threshold is meaningless for the configured search
    /// direction.
    #[error("window threshold {0} out of range for the configured search direction")]
    InvalidThreshold(u64),

    /// No backfill window could be located.
    #[error("no backfill window located ({nodes} nodes, {duration}s)")]
    NoWindow {
        /// Nodes discovered before the failure.
        nodes: u32,
        /// Bounding duration at the time of failure.
        duration: u64,
    },

    /// A core table operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for backfill operations.
pub type BackfillResult<T> = Result<T, BackfillError>;
