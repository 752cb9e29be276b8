//! Error types for the fdx-watch crate.

use fdx_index::{IndexError, ScanError, StoreError};
use thiserror::Error;
use tokio::task::JoinError;

/// Errors raised while watching and reconciling a root.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The notification backend failed.
    #[error("watch error: {0}")]
    Notify(#[from] notify::Error),

    /// Writing to the index failed; the batch was put back.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The root could not be scanned.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Any other index failure.
    #[error(transparent)]
    Index(IndexError),

    /// The writer task panicked or was aborted.
    #[error("watch task failed: {0}")]
    TaskJoin(#[from] JoinError),
}

impl From<IndexError> for WatchError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Store(e) => Self::Store(e),
            IndexError::Scan(e) => Self::Scan(e),
            other => Self::Index(other),
        }
    }
}
