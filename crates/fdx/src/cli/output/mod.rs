//! Rendering and JSON serialization for CLI output.

use std::{
    io::{self, IsTerminal},
    ops::Range,
    path::{Path, PathBuf},
    process::ExitCode,
};

use chrono::{DateTime, Local, Utc};
use comfy_table::{Cell, CellAlignment, Table, presets::UTF8_FULL_CONDENSED};
use fdx_index::{EntryKind, Highlights, ScoredResult};
use serde::Serialize;

/// ANSI escape sequences used by the CLI.
pub mod colors {
    /// Bold text.
    pub const BOLD: &str = "\x1b[1m";
    /// Cyan foreground.
    pub const CYAN: &str = "\x1b[36m";
    /// Yellow foreground.
    pub const YELLOW: &str = "\x1b[33m";
    /// Dimmed text.
    pub const DIM: &str = "\x1b[2m";
    /// Bold red on default background, for matched spans.
    pub const MATCH: &str = "\x1b[1;31m";
    /// Reset all attributes.
    pub const RESET: &str = "\x1b[0m";
}

/// Formats text as a section header (bold cyan).
pub fn header(text: &str) -> String {
    format!("{}{}{}{}", colors::BOLD, colors::CYAN, text, colors::RESET)
}

/// Formats text as a subheader (bold).
pub fn subheader(text: &str) -> String {
    format!("{}{}{}", colors::BOLD, text, colors::RESET)
}

/// Formats text as dimmed/less important.
pub fn dim(text: &str) -> String {
    format!("{}{}{}", colors::DIM, text, colors::RESET)
}

/// Formats text as a warning (yellow).
pub fn warning(text: &str) -> String {
    format!("{}{}{}", colors::YELLOW, text, colors::RESET)
}

/// Wraps each byte range of `text` in match styling.
///
/// Ranges must be sorted and non-overlapping; ranges that fall outside the
/// text or off a character boundary are skipped.
pub fn highlight(text: &str, ranges: &[Range<usize>]) -> String {
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;
    for range in ranges {
        if range.start < cursor
            || range.end > text.len()
            || !text.is_char_boundary(range.start)
            || !text.is_char_boundary(range.end)
        {
            continue;
        }
        output.push_str(&text[cursor..range.start]);
        output.push_str(colors::MATCH);
        output.push_str(&text[range.clone()]);
        output.push_str(colors::RESET);
        cursor = range.end;
    }
    output.push_str(&text[cursor..]);
    output
}

/// Formats a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    /// Unit suffixes in powers of 1024.
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Formats a timestamp in local time.
pub fn format_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

/// Serializes a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: failed to serialize JSON: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Returns true if stdout is a terminal, where styling is emitted.
pub fn stdout_is_terminal() -> bool {
    io::stdout().is_terminal()
}

/// A search result in JSON output. Content is omitted.
#[derive(Serialize)]
struct JsonResult<'a> {
    /// Absolute path.
    path: &'a Path,
    /// Path relative to the root.
    rel_path: &'a Path,
    /// File or directory.
    kind: EntryKind,
    /// Size in bytes.
    size: u64,
    /// Modification time.
    modified: DateTime<Utc>,
    /// Creation time, where reported.
    created: Option<DateTime<Utc>>,
    /// Whether metadata or content could not be read completely.
    degraded: bool,
    /// Ranking score.
    score: f32,
    /// Match spans, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    highlights: Option<&'a Highlights>,
}

/// JSON output for `fdx search`.
#[derive(Serialize)]
struct JsonSearchOutput<'a> {
    /// Roots that were searched.
    roots: &'a [PathBuf],
    /// Query text or pattern, if any.
    query: Option<&'a str>,
    /// Number of results returned.
    total_matches: usize,
    /// Ranked results.
    results: Vec<JsonResult<'a>>,
}

/// Prints search results as JSON.
pub fn print_results_json(
    roots: &[PathBuf],
    query: Option<&str>,
    results: &[ScoredResult],
) -> ExitCode {
    let output = JsonSearchOutput {
        roots,
        query,
        total_matches: results.len(),
        results: results
            .iter()
            .map(|r| JsonResult {
                path: &r.entry.path,
                rel_path: &r.entry.rel_path,
                kind: r.entry.kind,
                size: r.entry.size,
                modified: r.entry.modified,
                created: r.entry.created,
                degraded: r.entry.degraded,
                score: r.score,
                highlights: r.highlights.as_ref(),
            })
            .collect(),
    };
    print_json(&output)
}

/// Longest content snippet shown per result, in bytes.
const SNIPPET_WIDTH: usize = 80;

/// Renders search results as a table.
///
/// With `styled`, matched spans are highlighted. A content column appears
/// when any result matched in its content. Paths are shown relative to their
/// root unless `absolute` is set, as it is when several roots were searched.
pub fn results_table(results: &[ScoredResult], styled: bool, absolute: bool) -> Table {
    let show_content = results
        .iter()
        .any(|r| r.highlights.as_ref().is_some_and(|h| !h.content.is_empty()));

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    let mut columns = vec!["Score", "Kind", "Size", "Modified", "Path"];
    if show_content {
        columns.push("Match");
    }
    table.set_header(columns);

    for result in results {
        let entry = &result.entry;
        let path = display_path(result, styled, absolute);
        let size = if entry.kind == EntryKind::Directory {
            "-".to_string()
        } else {
            format_size(entry.size)
        };

        let mut row = vec![
            Cell::new(format!("{:.1}", result.score)).set_alignment(CellAlignment::Right),
            Cell::new(entry.kind.as_str()),
            Cell::new(size).set_alignment(CellAlignment::Right),
            Cell::new(format_time(entry.modified)),
            Cell::new(path),
        ];
        if show_content {
            let snippet = match (&result.highlights, &entry.content) {
                (Some(h), Some(content)) => content_snippet(content, &h.content, styled),
                _ => String::new(),
            };
            row.push(Cell::new(snippet));
        }
        table.add_row(row);
    }
    table
}

/// Formats a result's path, shifting the relative-path spans when the
/// absolute path is shown.
fn display_path(result: &ScoredResult, styled: bool, absolute: bool) -> String {
    let entry = &result.entry;
    let rel = entry.rel_path.to_string_lossy();
    let shown = if absolute {
        entry.path.to_string_lossy()
    } else {
        rel.clone()
    };
    match (&result.highlights, styled) {
        (Some(h), true) => {
            let offset = shown.len().saturating_sub(rel.len());
            let spans: Vec<Range<usize>> = h
                .path
                .iter()
                .map(|r| (r.start + offset)..(r.end + offset))
                .collect();
            highlight(&shown, &spans)
        }
        _ => shown.into_owned(),
    }
}

/// Returns the line holding the first content match, trimmed to a window.
pub fn content_snippet(content: &str, ranges: &[Range<usize>], styled: bool) -> String {
    let Some(first) = ranges.first() else {
        return String::new();
    };
    if first.end > content.len() {
        return String::new();
    }

    let line_start = content[..first.start].rfind('\n').map_or(0, |i| i + 1);
    let line_end = content[first.end..]
        .find('\n')
        .map_or(content.len(), |i| first.end + i);

    let mut start = line_start.max(first.start.saturating_sub(SNIPPET_WIDTH / 2));
    while !content.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = line_end.min(start + SNIPPET_WIDTH).max(first.end);
    while !content.is_char_boundary(end) {
        end += 1;
    }

    let window = &content[start..end];
    let text = if styled {
        let shifted: Vec<Range<usize>> = ranges
            .iter()
            .filter(|r| r.start >= start && r.end <= end)
            .map(|r| (r.start - start)..(r.end - start))
            .collect();
        highlight(window, &shifted)
    } else {
        window.to_string()
    };
    text.trim().to_string()
}
