//! Error types for fdx configuration.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use toml::{de, ser};

/// Errors that can occur when loading configuration or compiling ignore rules.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Failed to parse TOML configuration.
    #[error("failed to parse config file {path}: {source}")]
    ParseToml {
        /// Path to the file that could not be parsed.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: de::Error,
    },

    /// A glob pattern could not be compiled.
    ///
    /// Raised at compile time only; a matcher that compiled never fails while matching.
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The invalid pattern.
        pattern: String,
        /// Underlying glob error.
        source: globset::Error,
    },

    /// A pattern was empty after stripping its markers (`!`, `/`).
    #[error("empty glob pattern '{pattern}'")]
    EmptyPattern {
        /// The pattern as written.
        pattern: String,
    },

    /// Failed to serialize settings back to TOML.
    #[error("failed to serialize settings: {0}")]
    SerializeToml(#[from] ser::Error),
}
