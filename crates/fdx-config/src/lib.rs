//! Configuration system for fdx.
//!
//! fdx uses TOML configuration files named `.fdx.toml`. Configuration is resolved by walking up
//! the directory tree from the current working directory, collecting any `.fdx.toml` files
//! found, then loading `~/.fdx.toml` as the global config with lowest precedence.
//!
//! The crate also owns ignore-rule matching ([`IgnoreMatcher`]), since ignore patterns are
//! configuration and are compiled once, at load time.

#![warn(missing_docs)]

mod discovery;
mod error;
mod merge;
mod parse;
mod patterns;

use std::path::{Path, PathBuf};

pub use discovery::{CONFIG_FILENAME, discover_config_files, global_config_path};
pub use error::ConfigError;
pub use merge::{ParsedConfig, merge_configs};
pub use parse::{
    RawConfig, RawIndexingSettings, RawSearchSettings, RawWatchSettings, parse_config_file,
    parse_config_str,
};
pub use patterns::{GlobRule, IgnoreMatcher};
use serde::{Deserialize, Serialize};

/// Bytes per MiB, the unit of `max_file_size`.
const MIB: u64 = 1024 * 1024;

/// Ignore patterns applied when no configuration overrides them.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "*.pyc",
    "__pycache__/",
    ".git/",
    "node_modules/",
    "*.log",
    ".DS_Store",
    "Thumbs.db",
    "*.tmp",
    "*.swp",
];

/// Top-level merged configuration for fdx.
///
/// This represents the fully resolved configuration after merging all discovered
/// `.fdx.toml` files according to precedence rules.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Settings that change what a scan produces.
    pub indexing: IndexingSettings,
    /// Search-related settings.
    pub search: SearchSettings,
    /// Watch session settings.
    pub watch: WatchSettings,
    /// Directory containing the most specific config file.
    pub config_root: Option<PathBuf>,
}

impl Config {
    /// Loads configuration by discovering and merging all relevant `.fdx.toml` files.
    ///
    /// This is the main entry point for loading configuration. It:
    /// 1. Discovers all `.fdx.toml` files from `cwd` up to the filesystem root
    /// 2. Appends `~/.fdx.toml` if it exists
    /// 3. Parses each file
    /// 4. Merges them according to precedence rules (closest to `cwd` wins)
    ///
    /// Returns `Ok(Config::default())` if no configuration files are found.
    pub fn load(cwd: &Path) -> Result<Self, ConfigError> {
        let config_files = discover_config_files(cwd);
        Self::load_from_files(&config_files)
    }

    /// Loads configuration from a specific list of config file paths.
    ///
    /// Files should be provided in precedence order: highest precedence first.
    pub fn load_from_files(files: &[PathBuf]) -> Result<Self, ConfigError> {
        if files.is_empty() {
            return Ok(Self::default());
        }

        let parsed: Vec<ParsedConfig> = files
            .iter()
            .map(|path| {
                let config = parse_config_file(path)?;
                Ok(ParsedConfig {
                    path: path.clone(),
                    config,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(merge_configs(&parsed))
    }

    /// Compiles the ignore patterns and hidden-file policy into a matcher.
    pub fn compile_matcher(&self) -> Result<IgnoreMatcher, ConfigError> {
        self.indexing.compile_matcher()
    }

    /// Serializes the effective settings to TOML format.
    ///
    /// The output has the same shape as a `.fdx.toml` file.
    pub fn settings_to_toml(&self) -> Result<String, ConfigError> {
        let serializable = SerializableSettings {
            indexing: &self.indexing,
            search: &self.search,
            watch: &self.watch,
        };
        toml::to_string_pretty(&serializable).map_err(ConfigError::SerializeToml)
    }
}

/// Settings that change what a scan produces.
///
/// Any change here invalidates existing indexes (see the registry's config hash).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexingSettings {
    /// Ignore patterns, evaluated in order.
    pub ignore_patterns: Vec<String>,
    /// Largest file whose content is read, in MiB.
    pub max_file_size: u64,
    /// Whether hidden files and directories are indexed.
    pub include_hidden: bool,
    /// Whether symbolic links are followed.
    pub follow_symlinks: bool,
    /// Whether file content is indexed at all.
    pub content: bool,
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self {
            ignore_patterns: DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
            max_file_size: 10,
            include_hidden: false,
            follow_symlinks: true,
            content: true,
        }
    }
}

impl IndexingSettings {
    /// Returns the content size limit in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size.saturating_mul(MIB)
    }

    /// Compiles the ignore patterns and hidden-file policy into a matcher.
    pub fn compile_matcher(&self) -> Result<IgnoreMatcher, ConfigError> {
        IgnoreMatcher::compile(&self.ignore_patterns, self.include_hidden)
    }
}

/// Search-related settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Maximum results per query.
    pub max_results: usize,
    /// Whether match spans are computed for display.
    pub highlight: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_results: 100,
            highlight: true,
        }
    }
}

/// Watch session settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Quiet period after the last event before a batch is applied, in milliseconds.
    pub debounce_ms: u64,
    /// Per-file content read timeout in milliseconds.
    pub read_timeout_ms: u64,
    /// Capacity of the notification queue; overflowing it forces a full rescan.
    pub queue_capacity: usize,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 2000,
            read_timeout_ms: 5000,
            queue_capacity: 4096,
        }
    }
}

/// Internal struct for TOML serialization of settings.
#[derive(Serialize)]
struct SerializableSettings<'a> {
    /// Indexing settings.
    indexing: &'a IndexingSettings,
    /// Search settings.
    search: &'a SearchSettings,
    /// Watch settings.
    watch: &'a WatchSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexing_defaults() {
        let indexing = IndexingSettings::default();
        assert_eq!(indexing.max_file_size, 10);
        assert_eq!(indexing.max_file_size_bytes(), 10 * 1024 * 1024);
        assert!(!indexing.include_hidden);
        assert!(indexing.follow_symlinks);
        assert!(indexing.content);
        assert!(indexing.ignore_patterns.contains(&"node_modules/".to_string()));
    }

    #[test]
    fn test_search_and_watch_defaults() {
        let search = SearchSettings::default();
        assert_eq!(search.max_results, 100);
        assert!(search.highlight);

        let watch = WatchSettings::default();
        assert_eq!(watch.debounce_ms, 2000);
        assert_eq!(watch.read_timeout_ms, 5000);
        assert_eq!(watch.queue_capacity, 4096);
    }

    #[test]
    fn test_default_matcher_compiles() {
        let matcher = Config::default().compile_matcher().unwrap();
        assert!(matcher.is_excluded(Path::new("web/node_modules/x.js"), false));
        assert!(matcher.is_excluded(Path::new("cache/mod.pyc"), false));
        assert!(!matcher.is_excluded(Path::new("src/mod.py"), false));
    }

    #[test]
    fn test_settings_to_toml() {
        let toml = Config::default().settings_to_toml().unwrap();

        assert!(toml.contains("[indexing]"));
        assert!(toml.contains("[search]"));
        assert!(toml.contains("[watch]"));
        assert!(toml.contains("max_results = 100"));
        assert!(toml.contains("debounce_ms = 2000"));

        let parsed = parse_config_str(&toml, Path::new("roundtrip.toml")).unwrap();
        assert_eq!(parsed.indexing.unwrap().max_file_size, Some(10));
    }
}
