//! The indexed record for one filesystem object.

use std::{
    fmt,
    hash::Hasher,
    path::{Path, PathBuf},
    time::SystemTime,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use siphasher::sip128::{Hasher128, SipHasher};

/// Whether an entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// A regular file (or an unfollowed symlink).
    File,
    /// A directory.
    Directory,
}

impl EntryKind {
    /// Returns the stored string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
        }
    }

    /// Parses the stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(Self::File),
            "directory" | "dir" => Some(Self::Directory),
            _ => None,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The indexed record for one filesystem object under a root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Absolute path; the unique key within an index.
    pub path: PathBuf,
    /// Path relative to the indexed root.
    pub rel_path: PathBuf,
    /// File or directory.
    pub kind: EntryKind,
    /// Size in bytes; zero for directories.
    pub size: u64,
    /// Last modification time, truncated to microseconds.
    pub modified: DateTime<Utc>,
    /// Creation time, when the filesystem reports one.
    pub created: Option<DateTime<Utc>>,
    /// Hex SipHash-128 of the content, present only for files that were read.
    pub content_digest: Option<String>,
    /// Decoded text content, present only for readable text files within the size limit.
    #[serde(skip)]
    pub content: Option<String>,
    /// Set when some metadata or the content could not be read.
    pub degraded: bool,
    /// Lower-cased extension without the dot.
    pub extension: Option<String>,
    /// Absolute path of the parent directory.
    pub parent: Option<PathBuf>,
}

impl Entry {
    /// Returns the final path component.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Returns the relative directory containing the entry, empty at the root.
    pub fn rel_dir(&self) -> String {
        self.rel_path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Returns the absolute paths of every directory between the root and this entry.
    ///
    /// The root itself is included, the entry is not.
    pub fn ancestors(&self) -> Vec<PathBuf> {
        let depth = self.rel_path.components().count();
        self.path
            .ancestors()
            .skip(1)
            .take(depth)
            .map(Path::to_path_buf)
            .collect()
    }
}

/// Computes the hex content digest of a byte buffer.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = SipHasher::new();
    hasher.write(bytes);
    format!("{:032x}", hasher.finish128().as_u128())
}

/// Converts a filesystem timestamp to UTC, truncated to microseconds.
///
/// Truncation makes timestamps survive a round trip through the store unchanged.
pub fn to_utc_micros(time: SystemTime) -> DateTime<Utc> {
    let dt: DateTime<Utc> = time.into();
    DateTime::from_timestamp_micros(dt.timestamp_micros()).unwrap_or_default()
}

/// Returns the lower-cased extension of a path.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}
