//! Clap argument definitions for the `fdx` CLI.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use fdx_index::EntryKind;

/// Top-level CLI options.
#[derive(Parser)]
#[command(name = "fdx", version)]
#[command(about = "Index directory trees and search them by name, path and content")]
pub struct Cli {
    /// Increase log output (-v info, -vv debug); overrides FDX_LOG
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Arguments for `fdx index`.
#[derive(Args, Debug, Clone)]
pub struct IndexCommand {
    /// Directory to index
    pub dir: PathBuf,

    /// Index names and paths only, never file content
    #[arg(long)]
    pub filenames_only: bool,
}

/// Arguments for `fdx search`.
#[derive(Args, Debug, Clone, Default)]
pub struct SearchCommand {
    /// Search terms, or a glob such as '*.rs' [default: match everything]
    pub query: Option<String>,

    /// Glob pattern matched against names, or relative paths if it contains '/';
    /// combined with QUERY, results must match both
    #[arg(short = 'p', long)]
    pub pattern: Option<String>,

    /// Also search file content
    #[arg(short = 'c', long)]
    pub content: bool,

    /// Only return entries of this kind: file or directory
    #[arg(long = "type", value_parser = parse_kind)]
    pub kind: Option<EntryKind>,

    /// Minimum size in bytes (suffixes K, M, G allowed)
    #[arg(long, value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Maximum size in bytes (suffixes K, M, G allowed)
    #[arg(long, value_parser = parse_size)]
    pub max_size: Option<u64>,

    /// Only return files with this extension
    #[arg(long)]
    pub ext: Option<String>,

    /// Modified at or after this time (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_time)]
    pub modified_after: Option<DateTime<Utc>>,

    /// Modified at or before this time (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_time)]
    pub modified_before: Option<DateTime<Utc>>,

    /// Maximum results to return [default: from config, 100]
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Disable match highlighting
    #[arg(long)]
    pub no_highlight: bool,

    /// Indexed root to search [default: the root containing the current
    /// directory, or every indexed root if none contains it]
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Search every indexed root
    #[arg(short = 'a', long, conflicts_with = "root")]
    pub all: bool,
}

/// Arguments for `fdx watch`.
#[derive(Args, Debug, Clone)]
pub struct WatchCommand {
    /// Directory to watch; indexed first if needed
    pub dir: PathBuf,
}

/// Arguments for `fdx remove`.
#[derive(Args, Debug, Clone)]
pub struct RemoveCommand {
    /// Indexed directory to forget
    pub dir: PathBuf,
}

/// Arguments for `fdx rebuild`.
#[derive(Args, Debug, Clone)]
pub struct RebuildCommand {
    /// Indexed directory to rebuild [default: every indexed directory]
    pub dir: Option<PathBuf>,
}

/// Supported `fdx` subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Index a directory tree
    Index(IndexCommand),

    /// Search an index
    #[command(after_help = "\
QUERY SYNTAX:
  report            Names or paths containing the token 'report'
  quarterly report  Both tokens must match (implicit AND)
  *.txt             Glob on entry names
  src/*.rs          Glob on relative paths (contains '/')

EXAMPLES:
  fdx search report -c
  fdx search --ext rs --min-size 10K
  fdx search -p 'docs/**' --type file --json")]
    Search(SearchCommand),

    /// Watch a directory and keep its index current
    Watch(WatchCommand),

    /// List indexed directories
    List,

    /// Remove a directory's index
    Remove(RemoveCommand),

    /// Rebuild indexes from a fresh scan
    Rebuild(RebuildCommand),

    /// Show indexed directories, their freshness and statistics
    Status,

    /// Show effective configuration settings
    Config,
}

/// Parses an entry kind.
fn parse_kind(s: &str) -> Result<EntryKind, String> {
    EntryKind::parse(&s.to_ascii_lowercase())
        .ok_or_else(|| format!("unknown kind '{s}' (expected file or directory)"))
}

/// Parses a byte count with an optional binary suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let lower = s.trim().to_ascii_lowercase();
    let trimmed = lower.strip_suffix('b').unwrap_or(&lower);
    let (digits, multiplier) = match trimmed.chars().last() {
        Some('k') => (&trimmed[..trimmed.len() - 1], 1 << 10),
        Some('m') => (&trimmed[..trimmed.len() - 1], 1 << 20),
        Some('g') => (&trimmed[..trimmed.len() - 1], 1 << 30),
        _ => (trimmed, 1),
    };
    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid size '{s}'"))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size '{s}' is too large"))
}

/// Parses an RFC 3339 timestamp or a calendar date (midnight UTC).
pub fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(time) = DateTime::parse_from_rfc3339(s) {
        return Ok(time.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|time| time.and_utc())
        .ok_or_else(|| format!("invalid time '{s}' (expected YYYY-MM-DD or RFC 3339)"))
}
