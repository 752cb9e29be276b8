//! Range utilities for merging and extracting highlight spans.

use std::{collections::HashSet, ops::Range};

use tantivy::tokenizer::TextAnalyzer;

use crate::analyzer::token_spans;

/// Merges two sets of byte ranges, combining overlapping or adjacent ranges.
///
/// The result is sorted by start position with no overlaps.
pub fn merge_ranges(mut a: Vec<Range<usize>>, b: Vec<Range<usize>>) -> Vec<Range<usize>> {
    a.extend(b);
    a.sort_by_key(|r| r.start);

    let mut merged: Vec<Range<usize>> = Vec::with_capacity(a.len());
    for range in a {
        match merged.last_mut() {
            Some(current) if range.start <= current.end => {
                current.end = current.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Extracts byte ranges of tokens in `text` that belong to `terms`.
///
/// Offsets are relative to the original text and are sorted, non-overlapping,
/// and merged where adjacent.
pub fn extract_match_ranges(
    analyzer: &TextAnalyzer,
    text: &str,
    terms: &HashSet<String>,
) -> Vec<Range<usize>> {
    if terms.is_empty() || text.is_empty() {
        return Vec::new();
    }

    let ranges = token_spans(analyzer, text)
        .into_iter()
        .filter(|(token, _)| terms.contains(token))
        .map(|(_, span)| span)
        .collect();
    merge_ranges(ranges, Vec::new())
}
