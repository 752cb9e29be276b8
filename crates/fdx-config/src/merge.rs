//! Configuration merging.
//!
//! Merges multiple `RawConfig` files into a single resolved `Config`,
//! applying precedence rules field by field.

use std::path::PathBuf;

use crate::{
    Config, IndexingSettings, SearchSettings, WatchSettings,
    parse::{RawConfig, RawIndexingSettings, RawSearchSettings, RawWatchSettings},
};

/// A parsed config file with its source path.
pub struct ParsedConfig {
    /// Path to the config file.
    pub path: PathBuf,
    /// Parsed raw configuration.
    pub config: RawConfig,
}

/// Merges multiple configuration files into a single resolved `Config`.
///
/// Configs should be provided in precedence order: highest precedence first (closest to CWD),
/// lowest precedence last (global config).
///
/// Every field, including the ignore pattern list, takes the first defined value. Pattern
/// lists are replaced rather than concatenated so a project can drop a default rule.
pub fn merge_configs(configs: &[ParsedConfig]) -> Config {
    let mut config = Config::default();

    // Iterate in reverse (lowest precedence first) so higher precedence overwrites
    for parsed in configs.iter().rev() {
        if let Some(ref raw) = parsed.config.indexing {
            apply_raw_indexing(&mut config.indexing, raw);
        }
        if let Some(ref raw) = parsed.config.search {
            apply_raw_search(&mut config.search, raw);
        }
        if let Some(ref raw) = parsed.config.watch {
            apply_raw_watch(&mut config.watch, raw);
        }
    }

    config.config_root = configs
        .first()
        .and_then(|c| c.path.parent())
        .map(PathBuf::from);

    config
}

/// Applies raw indexing settings to result, overwriting any present values.
fn apply_raw_indexing(result: &mut IndexingSettings, raw: &RawIndexingSettings) {
    if let Some(ref v) = raw.ignore_patterns {
        result.ignore_patterns.clone_from(v);
    }
    if let Some(v) = raw.max_file_size {
        result.max_file_size = v;
    }
    if let Some(v) = raw.include_hidden {
        result.include_hidden = v;
    }
    if let Some(v) = raw.follow_symlinks {
        result.follow_symlinks = v;
    }
    if let Some(v) = raw.content {
        result.content = v;
    }
}

/// Applies raw search settings to result.
fn apply_raw_search(result: &mut SearchSettings, raw: &RawSearchSettings) {
    if let Some(v) = raw.max_results {
        result.max_results = v;
    }
    if let Some(v) = raw.highlight {
        result.highlight = v;
    }
}

/// Applies raw watch settings to result.
fn apply_raw_watch(result: &mut WatchSettings, raw: &RawWatchSettings) {
    if let Some(v) = raw.debounce_ms {
        result.debounce_ms = v;
    }
    if let Some(v) = raw.read_timeout_ms {
        result.read_timeout_ms = v;
    }
    if let Some(v) = raw.queue_capacity {
        result.queue_capacity = v;
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::parse_config_str;

    fn parsed(path: &str, contents: &str) -> ParsedConfig {
        ParsedConfig {
            path: PathBuf::from(path),
            config: parse_config_str(contents, Path::new(path)).unwrap(),
        }
    }

    #[test]
    fn test_empty_merge_is_default() {
        let config = merge_configs(&[]);
        assert_eq!(config.indexing, IndexingSettings::default());
        assert!(config.config_root.is_none());
    }

    #[test]
    fn test_closest_config_wins_per_field() {
        let configs = vec![
            parsed("/p/a/.fdx.toml", "[search]\nmax_results = 5\n"),
            parsed(
                "/p/.fdx.toml",
                "[search]\nmax_results = 50\nhighlight = false\n[watch]\ndebounce_ms = 10\n",
            ),
        ];

        let config = merge_configs(&configs);
        assert_eq!(config.search.max_results, 5);
        assert!(!config.search.highlight);
        assert_eq!(config.watch.debounce_ms, 10);
        assert_eq!(config.watch.queue_capacity, 4096);
        assert_eq!(config.config_root, Some(PathBuf::from("/p/a")));
    }

    #[test]
    fn test_ignore_patterns_replace_defaults() {
        let configs = vec![parsed(
            "/p/.fdx.toml",
            "[indexing]\nignore_patterns = [\"target/\"]\n",
        )];

        let config = merge_configs(&configs);
        assert_eq!(config.indexing.ignore_patterns, vec!["target/".to_string()]);
    }
}
