//! Change notifications and the intents derived from them.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// What happened to a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    /// The path appeared.
    Created,
    /// Content or metadata changed.
    Modified,
    /// The path disappeared.
    Deleted,
    /// The path was moved here from `from`.
    Renamed {
        /// Previous location.
        from: PathBuf,
    },
    /// Events were dropped; the notified state can no longer be trusted.
    Overflow,
}

/// One filesystem notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Affected path; empty for [`ChangeKind::Overflow`].
    pub path: PathBuf,
    /// What happened.
    pub kind: ChangeKind,
    /// When the change was observed.
    pub observed: DateTime<Utc>,
}

impl ChangeEvent {
    /// Creates an event observed at `observed`.
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>, observed: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            kind,
            observed,
        }
    }

    /// A creation observed now.
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Created, path, Utc::now())
    }

    /// A modification observed now.
    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Modified, path, Utc::now())
    }

    /// A deletion observed now.
    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Deleted, path, Utc::now())
    }

    /// A rename observed now.
    pub fn renamed(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Renamed { from: from.into() }, to, Utc::now())
    }

    /// An overflow signal observed now.
    pub fn overflow() -> Self {
        Self::new(ChangeKind::Overflow, PathBuf::new(), Utc::now())
    }

    /// Returns true for the overflow signal.
    pub fn is_overflow(&self) -> bool {
        self.kind == ChangeKind::Overflow
    }
}

/// The intent recorded for a path within one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// Index the path, including its subtree if it is a directory.
    Create,
    /// Refresh the path.
    Modify,
    /// Remove the path and everything beneath it.
    Delete,
}

/// A coalesced intent awaiting application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    /// Target path.
    pub path: PathBuf,
    /// Intent.
    pub kind: MutationKind,
    /// Observation time of the winning event.
    pub observed: DateTime<Utc>,
    /// Arrival order, breaking ties on `observed`.
    pub seq: u64,
}

impl PendingMutation {
    /// Returns true if `self` should replace `existing` for the same path.
    pub fn supersedes(&self, existing: &Self) -> bool {
        (self.observed, self.seq) >= (existing.observed, existing.seq)
    }
}
