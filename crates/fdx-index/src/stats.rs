//! Summary statistics over a snapshot.

use serde::Serialize;

use crate::{StoreError, entry::EntryKind, store::Snapshot};

/// Entry counts and sizes for one index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Number of files.
    pub files: usize,
    /// Number of directories.
    pub directories: usize,
    /// Entries flagged degraded.
    pub degraded: usize,
    /// Files whose content was indexed.
    pub with_content: usize,
    /// Sum of file sizes in bytes.
    pub total_size: u64,
}

impl IndexStats {
    /// Collects statistics from every entry in `snapshot`.
    pub fn collect(snapshot: &Snapshot) -> Result<Self, StoreError> {
        let mut stats = Self::default();
        for entry in snapshot.entries()? {
            match entry.kind {
                EntryKind::File => {
                    stats.files += 1;
                    stats.total_size = stats.total_size.saturating_add(entry.size);
                }
                EntryKind::Directory => stats.directories += 1,
            }
            if entry.degraded {
                stats.degraded += 1;
            }
            if entry.content.is_some() {
                stats.with_content += 1;
            }
        }
        Ok(stats)
    }

    /// Total number of entries.
    pub fn entries(&self) -> usize {
        self.files + self.directories
    }
}
