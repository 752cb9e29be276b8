//! Configuration file parsing.
//!
//! Parses individual `.fdx.toml` files into intermediate `RawConfig` structures
//! that preserve the optional nature of all fields before merging.

use std::{fs, path::Path};

use serde::Deserialize;
use serde_with::{OneOrMany, serde_as};

use crate::ConfigError;

/// Raw configuration as parsed directly from a TOML file.
///
/// All fields are optional to support partial configs that will be merged.
/// This mirrors the TOML schema exactly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// When true, stop discovery here - ignore parent and global configs.
    pub root: Option<bool>,
    /// Indexing settings section.
    pub indexing: Option<RawIndexingSettings>,
    /// Search settings section.
    pub search: Option<RawSearchSettings>,
    /// Watch settings section.
    pub watch: Option<RawWatchSettings>,
}

/// Raw indexing settings.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawIndexingSettings {
    /// Ignore patterns. Accepts a single string or an array of strings.
    #[serde_as(as = "Option<OneOrMany<_>>")]
    pub ignore_patterns: Option<Vec<String>>,
    /// Largest file whose content is read, in MiB.
    pub max_file_size: Option<u64>,
    /// Whether hidden files and directories are indexed.
    pub include_hidden: Option<bool>,
    /// Whether symbolic links are followed.
    pub follow_symlinks: Option<bool>,
    /// Whether file content is indexed at all.
    pub content: Option<bool>,
}

/// Raw search settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSearchSettings {
    /// Maximum results per query.
    pub max_results: Option<usize>,
    /// Whether match spans are computed for display.
    pub highlight: Option<bool>,
}

/// Raw watch settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawWatchSettings {
    /// Debounce window in milliseconds.
    pub debounce_ms: Option<u64>,
    /// Per-file content read timeout in milliseconds.
    pub read_timeout_ms: Option<u64>,
    /// Capacity of the notification queue.
    pub queue_capacity: Option<usize>,
}

/// Parses a configuration file from disk.
///
/// Returns a `RawConfig` with all fields as optionals, ready for merging.
pub fn parse_config_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    parse_config_str(&contents, path)
}

/// Parses configuration from a TOML string.
///
/// The `path` parameter is used for error reporting.
pub fn parse_config_str(contents: &str, path: &Path) -> Result<RawConfig, ConfigError> {
    toml::from_str(contents).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}

/// Checks if a config file has `root = true` set.
///
/// Returns false if the file can't be read or parsed.
pub fn is_root_config(path: &Path) -> bool {
    let Ok(contents) = fs::read_to_string(path) else {
        return false;
    };
    let Ok(config) = toml::from_str::<RawConfig>(&contents) else {
        return false;
    };
    config.root == Some(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(contents: &str) -> RawConfig {
        parse_config_str(contents, Path::new("test.toml")).unwrap()
    }

    #[test]
    fn test_parse_empty_config() {
        let config = parse("");
        assert!(config.root.is_none());
        assert!(config.indexing.is_none());
        assert!(config.search.is_none());
        assert!(config.watch.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse(
            r#"
root = true

[indexing]
ignore_patterns = ["*.log", "build/"]
max_file_size = 4
include_hidden = true
follow_symlinks = false
content = false

[search]
max_results = 20
highlight = false

[watch]
debounce_ms = 250
read_timeout_ms = 1000
queue_capacity = 64
"#,
        );

        assert_eq!(config.root, Some(true));

        let indexing = config.indexing.unwrap();
        assert_eq!(
            indexing.ignore_patterns,
            Some(vec!["*.log".to_string(), "build/".to_string()])
        );
        assert_eq!(indexing.max_file_size, Some(4));
        assert_eq!(indexing.include_hidden, Some(true));
        assert_eq!(indexing.follow_symlinks, Some(false));
        assert_eq!(indexing.content, Some(false));

        let search = config.search.unwrap();
        assert_eq!(search.max_results, Some(20));
        assert_eq!(search.highlight, Some(false));

        let watch = config.watch.unwrap();
        assert_eq!(watch.debounce_ms, Some(250));
        assert_eq!(watch.read_timeout_ms, Some(1000));
        assert_eq!(watch.queue_capacity, Some(64));
    }

    #[test]
    fn test_single_ignore_pattern_string() {
        let config = parse(
            r#"
[indexing]
ignore_patterns = "*.tmp"
"#,
        );
        assert_eq!(
            config.indexing.unwrap().ignore_patterns,
            Some(vec!["*.tmp".to_string()])
        );
    }

    #[test]
    fn test_parse_error_reports_path() {
        let err = parse_config_str("[indexing\n", Path::new("/x/.fdx.toml")).unwrap_err();
        assert!(err.to_string().contains("/x/.fdx.toml"));
    }

    #[test]
    fn test_is_root_config() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("root.toml");
        let plain = temp.path().join("plain.toml");
        fs::write(&root, "root = true\n").unwrap();
        fs::write(&plain, "[search]\nmax_results = 3\n").unwrap();

        assert!(is_root_config(&root));
        assert!(!is_root_config(&plain));
        assert!(!is_root_config(&temp.path().join("missing.toml")));
    }
}
