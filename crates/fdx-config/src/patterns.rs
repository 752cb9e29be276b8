//! Ignore-rule compilation and matching.
//!
//! Patterns are compiled once into [`GlobRule`] values and evaluated against
//! root-relative paths by an [`IgnoreMatcher`]. The syntax is a subset of
//! gitignore:
//!
//! - `*.log` (no separator) matches a single name at any depth
//! - `docs/*.md` (contains a separator) is anchored to the root
//! - `build/` (trailing separator) matches only directories, and therefore
//!   everything beneath them
//! - `!keep.log` re-includes what it matches
//!
//! Rules are evaluated in declaration order and the first matching rule decides.

use std::{
    ffi::OsStr,
    path::{Component, Path},
};

use globset::{GlobBuilder, GlobMatcher};

use crate::ConfigError;

/// Leading character that marks a hidden file or directory.
const HIDDEN_MARKER: char = '.';

/// Characters that turn a pattern into a glob rather than an exact name.
const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}'];

/// How a rule compares a path.
#[derive(Debug, Clone)]
enum RuleMatcher {
    /// Literal name or literal relative path.
    Exact(String),
    /// Compiled glob.
    Glob(GlobMatcher),
}

/// A single compiled pattern.
#[derive(Debug, Clone)]
pub struct GlobRule {
    /// Compiled comparison.
    matcher: RuleMatcher,
    /// Only directories match (pattern ended with `/`).
    dir_only: bool,
    /// Pattern contains a separator and is matched against whole paths.
    anchored: bool,
    /// Pattern started with `!`.
    negated: bool,
}

impl GlobRule {
    /// Compiles a pattern, rejecting malformed globs.
    pub fn compile(pattern: &str) -> Result<Self, ConfigError> {
        let mut body = pattern;

        let negated = body.starts_with('!');
        if negated {
            body = &body[1..];
        }

        let dir_only = body.ends_with('/');
        let body = body.trim_end_matches('/');
        let anchored = body.contains('/');
        let body = body.trim_start_matches('/');

        if body.is_empty() {
            return Err(ConfigError::EmptyPattern {
                pattern: pattern.to_string(),
            });
        }

        let matcher = if body.contains(GLOB_META) {
            let glob = GlobBuilder::new(body)
                .literal_separator(true)
                .build()
                .map_err(|source| ConfigError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
            RuleMatcher::Glob(glob.compile_matcher())
        } else {
            RuleMatcher::Exact(body.to_string())
        };

        Ok(Self {
            matcher,
            dir_only,
            anchored,
            negated,
        })
    }

    /// Matches the path itself, ignoring its ancestors.
    ///
    /// Unanchored rules compare the final path component; anchored rules compare
    /// the whole path.
    pub fn matches_entry(&self, path: &Path, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }

        if self.anchored {
            match &self.matcher {
                RuleMatcher::Exact(literal) => path == Path::new(literal),
                RuleMatcher::Glob(glob) => glob.is_match(path),
            }
        } else {
            let Some(name) = path.file_name() else {
                return false;
            };
            match &self.matcher {
                RuleMatcher::Exact(literal) => name == OsStr::new(literal),
                RuleMatcher::Glob(glob) => glob.is_match(name),
            }
        }
    }

    /// Matches the path or any of its ancestors within the relative path.
    ///
    /// Every proper ancestor is a directory, so directory-only rules apply to them.
    fn matches_with_ancestors(&self, rel_path: &Path, is_dir: bool) -> bool {
        rel_path
            .ancestors()
            .filter(|p| !p.as_os_str().is_empty())
            .any(|p| {
                let dir = p != rel_path || is_dir;
                self.matches_entry(p, dir)
            })
    }
}

/// Compiled ignore rules plus hidden-file policy.
///
/// `is_excluded` is a pure function of the compiled rules; it performs no I/O.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    /// Rules in declaration order.
    rules: Vec<GlobRule>,
    /// Whether hidden paths are indexed.
    include_hidden: bool,
}

impl IgnoreMatcher {
    /// Compiles ignore patterns. Fails on the first malformed pattern.
    pub fn compile<S: AsRef<str>>(
        patterns: &[S],
        include_hidden: bool,
    ) -> Result<Self, ConfigError> {
        let rules = patterns
            .iter()
            .map(|p| GlobRule::compile(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rules,
            include_hidden,
        })
    }

    /// Returns true if the root-relative path should be left out of the index.
    ///
    /// Hidden segments are checked first, then rules in order; the first rule
    /// that matches the path or one of its ancestors decides.
    pub fn is_excluded(&self, rel_path: &Path, is_dir: bool) -> bool {
        if !self.include_hidden && has_hidden_segment(rel_path) {
            return true;
        }

        self.rules
            .iter()
            .find(|rule| rule.matches_with_ancestors(rel_path, is_dir))
            .is_some_and(|rule| !rule.negated)
    }
}

/// Checks whether any normal component of the path starts with the hidden marker.
fn has_hidden_segment(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(name) => name
            .to_str()
            .is_some_and(|s| s.starts_with(HIDDEN_MARKER)),
        _ => false,
    })
}
