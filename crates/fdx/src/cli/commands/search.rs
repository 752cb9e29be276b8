//! Implementation of `fdx search`.

use std::process::ExitCode;

use fdx_config::SearchSettings;
use fdx_index::{Filters, IndexStatus, Query, QueryEngine, Snapshot, Target};

use super::shared::failure;
use crate::cli::{
    args::SearchCommand,
    context::CommandContext,
    output::{dim, print_results_json, results_table, stdout_is_terminal},
};

/// Searches the roots chosen by [`CommandContext::search_roots`].
pub fn run(ctx: &CommandContext, cmd: &SearchCommand) -> ExitCode {
    let roots = match ctx.search_roots(cmd.root.as_deref(), cmd.all) {
        Ok(roots) => roots,
        Err(code) => return code,
    };

    let styled = !cmd.json && stdout_is_terminal();
    let query = build_query(cmd, &ctx.config.search, cmd.json || styled);

    let mut batches = Vec::with_capacity(roots.len());
    let mut searched = Vec::with_capacity(roots.len());
    for root in &roots {
        let status = match ctx.effective_settings(root) {
            Ok(settings) => root.status(&settings),
            Err(code) => return code,
        };
        match status {
            IndexStatus::Missing if roots.len() == 1 => {
                eprintln!("error: index for {} is missing", root.root_path.display());
                eprintln!("Run 'fdx rebuild {}' to recreate it.", root.root_path.display());
                return ExitCode::FAILURE;
            }
            IndexStatus::Missing => {
                eprintln!(
                    "warning: skipping {}: index is missing",
                    root.root_path.display()
                );
                continue;
            }
            IndexStatus::ConfigChanged => {
                eprintln!(
                    "warning: index for {} is {}; run 'fdx rebuild' to refresh it",
                    root.root_path.display(),
                    status.description()
                );
            }
            IndexStatus::Current => {}
        }

        let snapshot = match Snapshot::open(&root.index_location) {
            Ok(snapshot) => snapshot,
            Err(e) => return failure("failed to open index")(e),
        };
        match QueryEngine::execute(&query, &snapshot) {
            Ok(results) => batches.push(results),
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        }
        searched.push(root.root_path.clone());
    }
    searched.sort();
    let results = QueryEngine::merge(batches, query.max_results);

    let text = cmd.query.as_deref().or(cmd.pattern.as_deref());
    if cmd.json {
        return print_results_json(&searched, text, &results);
    }

    if results.is_empty() {
        println!("{}", dim("No matches."));
        return ExitCode::SUCCESS;
    }

    println!("{}", results_table(&results, styled, searched.len() > 1));
    let scope = match searched.as_slice() {
        [root] => root.display().to_string(),
        all => format!("{} indexed roots", all.len()),
    };
    let mut footer = format!(
        "{} result{} in {scope}",
        results.len(),
        if results.len() == 1 { "" } else { "s" },
    );
    if results.len() == query.max_results {
        footer.push_str(" (limit reached; raise it with -n)");
    }
    println!("{}", dim(&footer));
    ExitCode::SUCCESS
}

/// Builds a query from command flags and search settings.
///
/// Highlights are computed only when they will be shown: `wants_spans` is
/// false for plain output to a pipe.
pub fn build_query(cmd: &SearchCommand, settings: &SearchSettings, wants_spans: bool) -> Query {
    let (target, also) = match (&cmd.query, &cmd.pattern) {
        (Some(text), Some(pattern)) => (Query::parse_target(text), Some(pattern.clone())),
        (Some(text), None) => (Query::parse_target(text), None),
        (None, Some(pattern)) => (Target::Pattern(pattern.clone()), None),
        (None, None) => (Target::All, None),
    };

    let mut query = Query::new(target);
    query.pattern = also;
    query.search_content = cmd.content;
    query.filters = Filters {
        kind: cmd.kind,
        min_size: cmd.min_size,
        max_size: cmd.max_size,
        modified_after: cmd.modified_after,
        modified_before: cmd.modified_before,
        extension: cmd.ext.clone(),
    };
    query.max_results = cmd.limit.unwrap_or(settings.max_results);
    query.highlight = wants_spans && settings.highlight && !cmd.no_highlight;
    query
}
