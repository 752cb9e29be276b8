//! Helpers shared by the indexing commands.

use std::{fmt::Display, path::Path, process::ExitCode, time::Duration};

use chrono::Utc;
use fdx_config::IndexingSettings;
use fdx_index::{EntryScanner, IndexRoot, IndexStore, RebuildStats, ScanOptions};

use crate::cli::{context::CommandContext, output::warning};

/// Returns a closure that reports an error and yields a failure exit code.
pub fn failure<E: Display>(action: &str) -> impl FnOnce(E) -> ExitCode + '_ {
    move |e| {
        eprintln!("error: {action}: {e}");
        ExitCode::FAILURE
    }
}

/// A freshly built index, still holding its writer.
pub struct Built {
    /// Registration after the scan was recorded.
    pub root: IndexRoot,
    /// Counts from the scan.
    pub stats: RebuildStats,
    /// The open store.
    pub store: IndexStore,
    /// The scanner the index was built with.
    pub scanner: EntryScanner,
}

/// Registers `root` with `settings` and replaces its index with a fresh scan.
pub fn build_index(
    ctx: &CommandContext,
    root: &Path,
    settings: &IndexingSettings,
) -> Result<Built, ExitCode> {
    let config = ctx.config_for(root)?;
    let matcher = settings
        .compile_matcher()
        .map_err(failure("invalid ignore patterns"))?;
    let options = ScanOptions::from_settings(
        settings,
        Duration::from_millis(config.watch.read_timeout_ms),
    );
    let scanner = EntryScanner::new(matcher, options);

    let lock = ctx.registry.root_lock(root);
    let _guard = lock.lock();

    let registered = ctx
        .registry
        .register(root, settings)
        .map_err(failure("failed to register root"))?;
    let mut store =
        IndexStore::open(&registered.index_location).map_err(failure("failed to open index"))?;

    let started = Utc::now();
    let stats = store
        .rebuild(&scanner, root)
        .map_err(failure("indexing failed"))?;
    let recorded = ctx
        .registry
        .record_scan(root, started, stats.entries as u64)
        .map_err(failure("failed to record scan"))?;

    Ok(Built {
        root: recorded,
        stats,
        store,
        scanner,
    })
}

/// Prints the outcome of a build.
pub fn print_build_summary(root: &Path, stats: &RebuildStats, elapsed: Duration) {
    println!(
        "Indexed {} entries ({} files, {} directories) in {} [{:.2}s]",
        stats.entries,
        stats.files,
        stats.directories,
        root.display(),
        elapsed.as_secs_f64()
    );
    if stats.degraded > 0 {
        println!(
            "{}",
            warning(&format!(
                "{} entries could not be read completely",
                stats.degraded
            ))
        );
    }
}
