//! Implementation of `fdx watch`.

use std::{path::Path, process::ExitCode, time::Instant};

use fdx_config::WatchSettings;
use fdx_index::Registry;
use fdx_watch::{
    EventStream, NotifySource, ReconcileStats, Reconciler, WatchOptions, WatchSession,
};
use tokio::{runtime::Builder, signal};
use tracing::{debug, info, warn};

use super::shared::{Built, build_index, failure, print_build_summary};
use crate::cli::{args::WatchCommand, context::CommandContext, output::dim};

/// Indexes a directory, then applies filesystem changes until Ctrl-C.
pub fn run(ctx: &CommandContext, cmd: &WatchCommand) -> ExitCode {
    let root = match ctx.resolve_root(&cmd.dir) {
        Ok(root) => root,
        Err(code) => return code,
    };
    let config = match ctx.config_for(&root) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let settings = match ctx.registry.get(&root) {
        Some(registered) => match ctx.effective_settings(&registered) {
            Ok(settings) => settings,
            Err(code) => return code,
        },
        None => config.indexing.clone(),
    };

    // The watcher starts before the scan; events that race it are replayed.
    let (source, stream) = match NotifySource::watch(&root, config.watch.queue_capacity) {
        Ok(pair) => pair,
        Err(e) => return failure("failed to start watcher")(e),
    };

    let started = Instant::now();
    let Built {
        stats,
        store,
        scanner,
        ..
    } = match build_index(ctx, &root, &settings) {
        Ok(built) => built,
        Err(code) => return code,
    };
    print_build_summary(&root, &stats, started.elapsed());

    let reconciler = match Reconciler::new(&root, scanner, store) {
        Ok(reconciler) => reconciler,
        Err(e) => return failure("failed to start reconciler")(e),
    };

    let runtime = match Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => return failure("failed to start runtime")(e),
    };
    runtime.block_on(serve(
        &ctx.registry,
        &root,
        reconciler,
        source,
        stream,
        &config.watch,
    ))
}

/// Runs the writer task until interrupted, then drains it.
///
/// Full rescans done along the way are recorded in the registry.
async fn serve(
    registry: &Registry,
    root: &Path,
    reconciler: Reconciler,
    source: NotifySource,
    stream: EventStream,
    settings: &WatchSettings,
) -> ExitCode {
    let session = WatchSession::spawn(reconciler, stream, WatchOptions::from_settings(settings));
    let mut stats = session.subscribe();
    let mut seen = *stats.borrow();
    println!("Watching {} (press Ctrl-C to stop)", root.display());

    let interrupt = signal::ctrl_c();
    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            result = &mut interrupt => {
                if let Err(e) = result {
                    warn!(error = %e, "cannot listen for Ctrl-C");
                }
                break;
            }
            changed = stats.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *stats.borrow_and_update();
                record_rescan(registry, root, &seen, &current);
                seen = current;
                info!(
                    batches = current.batches,
                    mutations = current.mutations,
                    full_rescans = current.full_rescans,
                    failures = current.failures,
                    "index updated"
                );
            }
        }
    }

    drop(source);
    match session.stop().await {
        Ok(reconciler) => {
            let last = reconciler.stats();
            record_rescan(registry, root, &seen, &last);
            println!("{}", dim(&stop_summary(&last)));
            ExitCode::SUCCESS
        }
        Err(e) => failure("watch session failed")(e),
    }
}

/// Records the latest full rescan if one completed since `seen`.
///
/// Returns true if the registry was updated.
fn record_rescan(
    registry: &Registry,
    root: &Path,
    seen: &ReconcileStats,
    current: &ReconcileStats,
) -> bool {
    if current.full_rescans == seen.full_rescans {
        return false;
    }
    let Some(time) = current.last_rescan else {
        return false;
    };
    match registry.record_scan(root, time, current.last_rescan_entries) {
        Ok(_) => {
            debug!(root = %root.display(), entries = current.last_rescan_entries, "recorded rescan");
            true
        }
        Err(e) => {
            warn!(root = %root.display(), error = %e, "cannot record rescan");
            false
        }
    }
}

/// Describes what a session did.
fn stop_summary(stats: &ReconcileStats) -> String {
    format!(
        "Stopped: {} batches, {} changes applied, {} full rescans, {} failed attempts",
        stats.batches, stats.mutations, stats.full_rescans, stats.failures
    )
}
