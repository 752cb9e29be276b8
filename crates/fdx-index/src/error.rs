//! Error types for the fdx-index crate.

use std::{io, path::PathBuf};

use fdx_config::ConfigError;
use thiserror::Error;

/// Errors that abort a scan before any entry is produced.
///
/// Failures on individual entries never surface here; they yield degraded entries.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The root could not be stat'ed or resolved.
    #[error("cannot access root {path}: {source}")]
    RootInaccessible {
        /// The root as given.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The root exists but is not a directory.
    #[error("root {path} is not a directory")]
    NotADirectory {
        /// The root as given.
        path: PathBuf,
    },
}

/// Errors raised by the index store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to open or create the index.
    #[error("failed to open index at {path}: {message}")]
    Open {
        /// Path to the index directory.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// A write or commit failed. The pending batch was rolled back; retrying is safe.
    #[error("failed to write to index: {0}")]
    Write(String),

    /// A rollback failed and the writer can no longer be used; reopen the index.
    #[error("index writer for {0} was lost after a failed rollback")]
    WriterLost(PathBuf),

    /// A read from a snapshot failed.
    #[error("failed to read index: {0}")]
    Read(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Creates an `Open` error from a path and Tantivy error.
    pub(crate) fn open(path: PathBuf, source: &tantivy::TantivyError) -> Self {
        Self::Open {
            path,
            message: source.to_string(),
        }
    }

    /// Creates a `Write` error from a Tantivy error.
    pub(crate) fn write(source: &tantivy::TantivyError) -> Self {
        Self::Write(source.to_string())
    }

    /// Creates a `Read` error from a Tantivy error.
    pub(crate) fn read(source: &tantivy::TantivyError) -> Self {
        Self::Read(source.to_string())
    }

    /// Returns true if the operation can be retried once the cause clears.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Write(_) | Self::Io(_))
    }
}

/// Errors raised while validating or executing a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The name pattern could not be compiled.
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[source] ConfigError),

    /// The query is self-contradictory or otherwise malformed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Reading from the snapshot failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by the root registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// I/O error while reading or writing the catalog.
    #[error("registry I/O error: {0}")]
    Io(#[from] io::Error),

    /// The catalog file is not valid JSON.
    #[error("failed to parse registry {path}: {source}")]
    Parse {
        /// Path to the catalog file.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The catalog could not be serialized.
    #[error("failed to serialize registry: {0}")]
    Serialize(#[source] serde_json::Error),

    /// No index is registered for the root.
    #[error("no index registered for {0}")]
    NotRegistered(PathBuf),

    /// The platform data directory could not be determined.
    #[error("could not determine a data directory")]
    NoDataDirectory,
}

/// Any error surfaced by this crate.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Scan error.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Query error.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Registry error.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
