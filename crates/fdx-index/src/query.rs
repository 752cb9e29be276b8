//! Structured queries over a snapshot.
//!
//! A [`Query`] selects candidates by term, by glob pattern, or takes every entry,
//! then narrows them with an optional second pattern and conjunctive [`Filters`]. Results are ranked by weighted
//! term occurrences and returned in a fully deterministic order.

use std::{
    cmp::Ordering,
    collections::HashSet,
    ops::Range,
    path::Path,
};

use chrono::{DateTime, Utc};
use fdx_config::GlobRule;
use serde::Serialize;
use tantivy::{
    DocAddress, TantivyDocument, Term,
    collector::DocSetCollector,
    query::{AllQuery, BooleanQuery, Occur, Query as TantivyQuery, TermQuery},
    schema::{Field, IndexRecordOption},
    tokenizer::TextAnalyzer,
};
use tracing::debug;

use crate::{
    QueryError, StoreError,
    analyzer::tokenize,
    entry::{Entry, EntryKind},
    ranges::extract_match_ranges,
    store::Snapshot,
};

/// Per-field weights for term occurrences.
pub mod weight {
    /// A match in the entry name.
    pub const NAME: f32 = 3.0;
    /// A match in the relative directory path, or a pattern match.
    pub const PATH: f32 = 2.0;
    /// A match in file content.
    pub const CONTENT: f32 = 1.0;
}

/// Default result limit.
const DEFAULT_MAX_RESULTS: usize = 100;

/// Characters that make query text a glob pattern.
const GLOB_META: &[char] = &['*', '?', '['];

/// What a query selects before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every entry.
    All,
    /// Entries containing every token of the text.
    Term(String),
    /// Entries whose path matches a glob.
    Pattern(String),
}

/// Conjunctive post-filters; bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    /// Only files or only directories.
    pub kind: Option<EntryKind>,
    /// Minimum size in bytes.
    pub min_size: Option<u64>,
    /// Maximum size in bytes.
    pub max_size: Option<u64>,
    /// Modified at or after.
    pub modified_after: Option<DateTime<Utc>>,
    /// Modified at or before.
    pub modified_before: Option<DateTime<Utc>>,
    /// Extension, case-insensitive, with or without the leading dot.
    pub extension: Option<String>,
}

impl Filters {
    /// Rejects contradictory bounds.
    pub fn validate(&self) -> Result<(), QueryError> {
        if let (Some(min), Some(max)) = (self.min_size, self.max_size)
            && min > max
        {
            return Err(QueryError::InvalidQuery(format!(
                "min_size {min} exceeds max_size {max}"
            )));
        }
        if let (Some(after), Some(before)) = (self.modified_after, self.modified_before)
            && after > before
        {
            return Err(QueryError::InvalidQuery(format!(
                "modified_after {after} is later than modified_before {before}"
            )));
        }
        Ok(())
    }

    /// Returns true if the entry passes every filter.
    pub fn matches(&self, entry: &Entry) -> bool {
        let wanted_ext = self
            .extension
            .as_deref()
            .map(|e| e.trim_start_matches('.').to_lowercase());

        self.kind.is_none_or(|k| entry.kind == k)
            && self.min_size.is_none_or(|min| entry.size >= min)
            && self.max_size.is_none_or(|max| entry.size <= max)
            && self.modified_after.is_none_or(|t| entry.modified >= t)
            && self.modified_before.is_none_or(|t| entry.modified <= t)
            && wanted_ext.is_none_or(|ext| entry.extension.as_deref() == Some(ext.as_str()))
    }
}

/// A structured query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Candidate selection.
    pub target: Target,
    /// Whether term queries also look at file content.
    pub search_content: bool,
    /// Post-filters.
    pub filters: Filters,
    /// Glob every result must also match, whatever the target.
    pub pattern: Option<String>,
    /// Maximum number of results.
    pub max_results: usize,
    /// Whether to compute match spans.
    pub highlight: bool,
}

impl Query {
    /// Creates a query with no filters and default limits.
    pub fn new(target: Target) -> Self {
        Self {
            target,
            search_content: false,
            filters: Filters::default(),
            pattern: None,
            max_results: DEFAULT_MAX_RESULTS,
            highlight: false,
        }
    }

    /// Classifies free text: empty selects everything, glob metacharacters make a pattern.
    pub fn parse_target(text: &str) -> Target {
        let text = text.trim();
        if text.is_empty() {
            Target::All
        } else if text.contains(GLOB_META) {
            Target::Pattern(text.to_string())
        } else {
            Target::Term(text.to_string())
        }
    }
}

/// Byte spans of matched tokens, per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Highlights {
    /// Spans in the entry name.
    pub name: Vec<Range<usize>>,
    /// Spans in the relative path.
    pub path: Vec<Range<usize>>,
    /// Spans in the content.
    pub content: Vec<Range<usize>>,
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredResult {
    /// The matching entry.
    pub entry: Entry,
    /// Weighted occurrence score.
    pub score: f32,
    /// Match spans, when requested.
    pub highlights: Option<Highlights>,
}

/// How candidates were selected, with what the scorer needs.
enum Matcher {
    /// Every entry, unscored.
    All,
    /// Token conjunction.
    Terms(Vec<String>),
    /// Compiled glob.
    Pattern(GlobRule),
}

/// Executes queries against snapshots.
pub struct QueryEngine;

impl QueryEngine {
    /// Runs a query. An empty result is not an error.
    pub fn execute(query: &Query, snapshot: &Snapshot) -> Result<Vec<ScoredResult>, QueryError> {
        query.filters.validate()?;
        let analyzer = snapshot.analyzer();

        let matcher = match &query.target {
            Target::All => Matcher::All,
            Target::Term(text) => {
                let mut tokens = tokenize(analyzer, text);
                let mut seen = HashSet::new();
                tokens.retain(|t| seen.insert(t.clone()));
                if tokens.is_empty() {
                    return Err(QueryError::InvalidQuery(format!(
                        "'{text}' contains no searchable terms"
                    )));
                }
                Matcher::Terms(tokens)
            }
            Target::Pattern(pattern) => Matcher::Pattern(compile_pattern(pattern)?),
        };
        let also = query.pattern.as_deref().map(compile_pattern).transpose()?;

        let addresses = match &matcher {
            Matcher::Terms(tokens) => {
                let tantivy_query = Self::term_query(snapshot, tokens, query.search_content);
                Self::collect(snapshot, &tantivy_query)?
            }
            Matcher::All | Matcher::Pattern(_) => Self::collect(snapshot, &AllQuery)?,
        };

        let mut results = Vec::new();
        for address in addresses {
            let doc: TantivyDocument = snapshot
                .searcher()
                .doc(address)
                .map_err(|e| StoreError::read(&e))?;
            let entry = snapshot.to_entry(&doc);

            if !query.filters.matches(&entry) {
                continue;
            }
            if let Matcher::Pattern(rule) = &matcher
                && !glob_matches(rule, &entry)
            {
                continue;
            }
            if also.as_ref().is_some_and(|rule| !glob_matches(rule, &entry)) {
                continue;
            }

            let score = Self::score(&matcher, &entry, analyzer, query.search_content);
            let highlights = query
                .highlight
                .then(|| Self::highlights(&matcher, &entry, analyzer, query.search_content));
            results.push(ScoredResult {
                entry,
                score,
                highlights,
            });
        }

        results.sort_by(compare_results);
        results.truncate(query.max_results);
        debug!(target = ?query.target, results = results.len(), "query executed");
        Ok(results)
    }

    /// Merges result lists from several snapshots into one ranking.
    ///
    /// The order is the same as for a single snapshot, and only the best
    /// `max_results` are kept.
    pub fn merge(
        batches: impl IntoIterator<Item = Vec<ScoredResult>>,
        max_results: usize,
    ) -> Vec<ScoredResult> {
        let mut merged: Vec<ScoredResult> = batches.into_iter().flatten().collect();
        merged.sort_by(compare_results);
        merged.truncate(max_results);
        merged
    }

    /// Builds a conjunction over tokens, each matching any searched field.
    fn term_query(snapshot: &Snapshot, tokens: &[String], search_content: bool) -> BooleanQuery {
        let schema = snapshot.schema();
        let mut fields = vec![schema.name, schema.rel_dir];
        if search_content {
            fields.push(schema.content);
        }

        let clauses: Vec<(Occur, Box<dyn TantivyQuery>)> = tokens
            .iter()
            .map(|token| {
                let per_field: Vec<(Occur, Box<dyn TantivyQuery>)> = fields
                    .iter()
                    .map(|&field| (Occur::Should, Self::token_query(field, token)))
                    .collect();
                (
                    Occur::Must,
                    Box::new(BooleanQuery::new(per_field)) as Box<dyn TantivyQuery>,
                )
            })
            .collect();
        BooleanQuery::new(clauses)
    }

    /// Exact term query for one token in one field.
    fn token_query(field: Field, token: &str) -> Box<dyn TantivyQuery> {
        Box::new(TermQuery::new(
            Term::from_field_text(field, token),
            IndexRecordOption::Basic,
        ))
    }

    /// Collects every matching document address.
    fn collect(
        snapshot: &Snapshot,
        query: &dyn TantivyQuery,
    ) -> Result<Vec<DocAddress>, QueryError> {
        let addresses = snapshot
            .searcher()
            .search(query, &DocSetCollector)
            .map_err(|e| StoreError::read(&e))?;
        Ok(addresses.into_iter().collect())
    }

    /// Weighted occurrence count of the query tokens.
    fn score(matcher: &Matcher, entry: &Entry, analyzer: &TextAnalyzer, search_content: bool) -> f32 {
        match matcher {
            Matcher::All => 0.0,
            Matcher::Pattern(_) => weight::PATH,
            Matcher::Terms(tokens) => {
                let terms: HashSet<&str> = tokens.iter().map(String::as_str).collect();
                let count = |text: &str| -> f32 {
                    tokenize(analyzer, text)
                        .iter()
                        .filter(|t| terms.contains(t.as_str()))
                        .count() as f32
                };

                let mut score =
                    count(&entry.name()) * weight::NAME + count(&entry.rel_dir()) * weight::PATH;
                if search_content && let Some(content) = &entry.content {
                    score += count(content) * weight::CONTENT;
                }
                score
            }
        }
    }

    /// Match spans for display.
    fn highlights(
        matcher: &Matcher,
        entry: &Entry,
        analyzer: &TextAnalyzer,
        search_content: bool,
    ) -> Highlights {
        match matcher {
            Matcher::All => Highlights::default(),
            Matcher::Pattern(rule) => {
                let name = entry.name();
                if rule.matches_entry(Path::new(&name), entry.is_dir()) {
                    Highlights {
                        name: vec![0..name.len()],
                        ..Highlights::default()
                    }
                } else {
                    let rel = entry.rel_path.to_string_lossy();
                    Highlights {
                        path: vec![0..rel.len()],
                        ..Highlights::default()
                    }
                }
            }
            Matcher::Terms(tokens) => {
                let terms: HashSet<String> = tokens.iter().cloned().collect();
                let content = match (&entry.content, search_content) {
                    (Some(content), true) => extract_match_ranges(analyzer, content, &terms),
                    _ => Vec::new(),
                };
                Highlights {
                    name: extract_match_ranges(analyzer, &entry.name(), &terms),
                    path: extract_match_ranges(analyzer, &entry.rel_path.to_string_lossy(), &terms),
                    content,
                }
            }
        }
    }
}

/// Compiles a query glob.
fn compile_pattern(pattern: &str) -> Result<GlobRule, QueryError> {
    GlobRule::compile(pattern).map_err(QueryError::InvalidPattern)
}

/// Matches a glob against the relative path, falling back to the absolute one.
fn glob_matches(rule: &GlobRule, entry: &Entry) -> bool {
    rule.matches_entry(&entry.rel_path, entry.is_dir())
        || rule.matches_entry(&entry.path, entry.is_dir())
}

/// Result order: score descending, files before directories, then path ascending.
fn compare_results(a: &ScoredResult, b: &ScoredResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.entry.kind.cmp(&b.entry.kind))
        .then_with(|| a.entry.path.cmp(&b.entry.path))
}

#[cfg(test)]
mod test {
    use std::{fs, path::PathBuf};

    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    use super::*;
    use crate::{
        scan::{EntryScanner, ScanOptions},
        store::IndexStore,
    };

    /// An indexed scratch tree.
    struct Fixture {
        /// Keeps the scanned tree alive.
        _tree: TempDir,
        /// Keeps the index directory alive.
        _index: TempDir,
        /// Store holding the scanned tree.
        store: IndexStore,
    }

    impl Fixture {
        fn new(files: &[(&str, &str)]) -> Self {
            let tree = TempDir::new().unwrap();
            for (rel, content) in files {
                let path = tree.path().join(rel);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, content).unwrap();
            }
            let index = TempDir::new().unwrap();
            let mut store = IndexStore::open(index.path()).unwrap();
            let scanner = EntryScanner::new(Default::default(), ScanOptions::default());
            store.rebuild(&scanner, tree.path()).unwrap();
            Self {
                _tree: tree,
                _index: index,
                store,
            }
        }

        fn run(&self, query: &Query) -> Vec<ScoredResult> {
            QueryEngine::execute(query, &self.store.snapshot()).unwrap()
        }

        fn run_err(&self, query: &Query) -> QueryError {
            QueryEngine::execute(query, &self.store.snapshot()).unwrap_err()
        }
    }

    fn rel(results: &[ScoredResult]) -> Vec<PathBuf> {
        results.iter().map(|r| r.entry.rel_path.clone()).collect()
    }

    fn paths(items: &[&str]) -> Vec<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    fn fixture() -> Fixture {
        Fixture::new(&[
            ("report.txt", "quarterly numbers"),
            ("reports/q1.txt", "the report for q1"),
            ("notes/todo.md", "write the report report"),
            ("src/main.rs", "fn main() {}"),
        ])
    }

    #[test]
    fn parse_target_classifies_text() {
        assert_eq!(Query::parse_target("  "), Target::All);
        assert_eq!(Query::parse_target("*.py"), Target::Pattern("*.py".into()));
        assert_eq!(
            Query::parse_target("report final"),
            Target::Term("report final".into())
        );
    }

    #[test]
    fn term_matches_whole_tokens_in_names() {
        let f = fixture();
        let results = f.run(&Query::new(Target::Term("report".into())));

        assert_eq!(rel(&results), paths(&["report.txt"]));
        assert_eq!(results[0].score, weight::NAME);
    }

    #[test]
    fn names_outrank_directories() {
        let f = fixture();
        let results = f.run(&Query::new(Target::Term("REPORTS".into())));

        assert_eq!(rel(&results), paths(&["reports", "reports/q1.txt"]));
        assert_eq!(results[0].score, weight::NAME);
        assert_eq!(results[1].score, weight::PATH);
    }

    #[test]
    fn every_token_must_match() {
        let f = fixture();
        let results = f.run(&Query::new(Target::Term("reports q1".into())));
        assert_eq!(rel(&results), paths(&["reports/q1.txt"]));
        assert_eq!(results[0].score, weight::NAME + weight::PATH);

        let none = f.run(&Query::new(Target::Term("reports main".into())));
        assert!(none.is_empty());
    }

    #[test]
    fn content_search_counts_occurrences() {
        let f = fixture();
        let mut query = Query::new(Target::Term("report".into()));
        query.search_content = true;
        let results = f.run(&query);

        assert_eq!(
            rel(&results),
            paths(&["report.txt", "notes/todo.md", "reports/q1.txt"])
        );
        let scores: Vec<f32> = results.iter().map(|r| r.score).collect();
        assert_eq!(
            scores,
            vec![weight::NAME, 2.0 * weight::CONTENT, weight::CONTENT]
        );
    }

    #[test]
    fn equal_scores_put_files_first_then_paths() {
        let f = Fixture::new(&[("data.csv", ""), ("data/x.txt", ""), ("b/data", "")]);
        let results = f.run(&Query::new(Target::Term("data".into())));

        assert_eq!(
            rel(&results),
            paths(&["b/data", "data.csv", "data", "data/x.txt"])
        );
    }

    #[test]
    fn repeated_execution_is_deterministic() {
        let f = fixture();
        let query = Query::new(Target::All);

        let first = f.run(&query);
        for _ in 0..3 {
            assert_eq!(f.run(&query), first);
        }
        assert_eq!(first.len(), 7);
    }

    #[test]
    fn unanchored_pattern_matches_names() {
        let f = fixture();
        let results = f.run(&Query::new(Target::Pattern("*.txt".into())));

        assert_eq!(rel(&results), paths(&["report.txt", "reports/q1.txt"]));
        assert!(results.iter().all(|r| r.score == weight::PATH));
    }

    #[test]
    fn anchored_pattern_matches_relative_path() {
        let f = fixture();
        let results = f.run(&Query::new(Target::Pattern("reports/*.txt".into())));
        assert_eq!(rel(&results), paths(&["reports/q1.txt"]));
    }

    #[test]
    fn filters_are_conjunctive() {
        let f = fixture();

        let mut query = Query::new(Target::All);
        query.filters.kind = Some(EntryKind::Directory);
        assert_eq!(rel(&f.run(&query)), paths(&["notes", "reports", "src"]));

        let mut query = Query::new(Target::All);
        query.filters.extension = Some(".TXT".into());
        assert_eq!(rel(&f.run(&query)), paths(&["report.txt", "reports/q1.txt"]));

        let mut query = Query::new(Target::All);
        query.filters.min_size = Some(20);
        assert_eq!(rel(&f.run(&query)), paths(&["notes/todo.md"]));

        let mut query = Query::new(Target::All);
        query.filters.kind = Some(EntryKind::File);
        query.filters.max_size = Some(12);
        assert_eq!(rel(&f.run(&query)), paths(&["src/main.rs"]));

        let mut query = Query::new(Target::All);
        query.filters.min_size = Some(17);
        query.filters.max_size = Some(17);
        assert_eq!(rel(&f.run(&query)), paths(&["report.txt", "reports/q1.txt"]));
    }

    #[test]
    fn modified_bounds_are_inclusive() {
        let f = fixture();
        let entry = f
            .store
            .snapshot()
            .entries()
            .unwrap()
            .into_iter()
            .find(|e| e.name() == "main.rs")
            .unwrap();

        let mut query = Query::new(Target::Term("main".into()));
        query.filters.modified_after = Some(entry.modified);
        query.filters.modified_before = Some(entry.modified);
        assert_eq!(rel(&f.run(&query)), paths(&["src/main.rs"]));

        query.filters.modified_after = Some(entry.modified + Duration::microseconds(1));
        query.filters.modified_before = None;
        assert!(f.run(&query).is_empty());
    }

    #[test]
    fn contradictory_bounds_are_rejected() {
        let f = fixture();

        let mut query = Query::new(Target::All);
        query.filters.min_size = Some(10);
        query.filters.max_size = Some(5);
        assert!(matches!(f.run_err(&query), QueryError::InvalidQuery(_)));

        let mut query = Query::new(Target::All);
        query.filters.modified_after = Some(Utc.timestamp_opt(2_000, 0).unwrap());
        query.filters.modified_before = Some(Utc.timestamp_opt(1_000, 0).unwrap());
        assert!(matches!(f.run_err(&query), QueryError::InvalidQuery(_)));
    }

    #[test]
    fn malformed_queries_are_rejected() {
        let f = fixture();
        assert!(matches!(
            f.run_err(&Query::new(Target::Pattern("src/[abc".into()))),
            QueryError::InvalidPattern(_)
        ));
        assert!(matches!(
            f.run_err(&Query::new(Target::Term("--".into()))),
            QueryError::InvalidQuery(_)
        ));
    }

    #[test]
    fn extra_pattern_narrows_terms() {
        let f = fixture();
        let mut query = Query::new(Target::Term("report".into()));
        query.search_content = true;
        query.pattern = Some("*.md".into());
        let results = f.run(&query);

        assert_eq!(rel(&results), paths(&["notes/todo.md"]));
        assert_eq!(results[0].score, 2.0 * weight::CONTENT);

        query.pattern = Some("*.rs".into());
        assert!(f.run(&query).is_empty());

        query.pattern = Some("src/[abc".into());
        assert!(matches!(f.run_err(&query), QueryError::InvalidPattern(_)));
    }

    #[test]
    fn merged_results_keep_the_ranking() {
        let a = Fixture::new(&[("report.txt", ""), ("data/report", "")]);
        let b = Fixture::new(&[("report/report.txt", "")]);
        let query = Query::new(Target::Term("report".into()));

        let merged = QueryEngine::merge([a.run(&query), b.run(&query)], 10);
        assert_eq!(
            rel(&merged),
            paths(&["report/report.txt", "data/report", "report.txt", "report"])
        );
        assert_eq!(merged[0].score, weight::NAME + weight::PATH);
        assert_eq!(merged[3].entry.kind, EntryKind::Directory);

        assert_eq!(QueryEngine::merge([a.run(&query), b.run(&query)], 1).len(), 1);
    }

    #[test]
    fn no_match_is_an_empty_result() {
        let f = fixture();
        assert!(f.run(&Query::new(Target::Term("absent".into()))).is_empty());
    }

    #[test]
    fn results_are_truncated_after_sorting() {
        let f = fixture();
        let mut query = Query::new(Target::All);
        query.max_results = 2;
        assert_eq!(rel(&f.run(&query)), paths(&["notes/todo.md", "report.txt"]));
    }

    #[test]
    fn highlights_cover_each_field() {
        let f = fixture();
        let mut query = Query::new(Target::Term("report".into()));
        query.search_content = true;
        query.highlight = true;
        let results = f.run(&query);

        let top = results[0].highlights.as_ref().unwrap();
        assert_eq!(top.name, vec![0..6]);
        assert_eq!(top.path, vec![0..6]);
        assert!(top.content.is_empty());

        let todo = results[1].highlights.as_ref().unwrap();
        assert!(todo.name.is_empty());
        assert_eq!(todo.content, vec![10..16, 17..23]);

        let plain = f.run(&Query::new(Target::Term("report".into())));
        assert!(plain[0].highlights.is_none());
    }
}
