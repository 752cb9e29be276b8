//! Implementation of `fdx status`.

use std::process::ExitCode;

use fdx_config::discover_config_files;
use fdx_index::{IndexRoot, IndexStats, IndexStatus, Snapshot};

use crate::cli::{
    context::CommandContext,
    output::{dim, format_size, format_time, subheader, warning},
};

/// Shows configuration files, the data directory, and each index with statistics.
///
/// Fails if any index is missing or built with outdated settings.
pub fn run(ctx: &CommandContext) -> ExitCode {
    println!("{}", subheader("Config files:"));
    let config_files = discover_config_files(&ctx.cwd);
    if config_files.is_empty() {
        println!("   {}", dim("(none, using defaults)"));
    }
    for path in &config_files {
        println!("   {}", path.display());
    }
    println!();

    println!("{}", subheader("Data directory:"));
    println!("   {}", ctx.registry.data_dir().display());
    println!();

    let roots = ctx.registry.list();
    println!("{}", subheader("Indexes:"));
    if roots.is_empty() {
        println!("   {}", dim("(none)"));
        return ExitCode::SUCCESS;
    }

    let mut stale = 0;
    for root in &roots {
        let status = match ctx.effective_settings(root) {
            Ok(settings) => root.status(&settings),
            Err(code) => return code,
        };
        if status.needs_rebuild() {
            stale += 1;
        }
        print_root(root, status);
    }
    println!();

    if stale > 0 {
        println!(
            "{}",
            warning(&format!("{stale} index(es) need a rebuild: run 'fdx rebuild'"))
        );
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Prints one root with its status and, when readable, snapshot statistics.
fn print_root(root: &IndexRoot, status: IndexStatus) {
    let label = if status.needs_rebuild() {
        warning(&format!("[{}]", status.description()))
    } else {
        dim(&format!("[{}]", status.description()))
    };
    println!("   {} {label}", root.root_path.display());
    println!("      {}", dim(&format!("index: {}", root.index_location.display())));
    if let Some(scanned) = root.last_full_scan_time {
        println!("      {}", dim(&format!("last full scan: {}", format_time(scanned))));
    }
    if !root.settings.content {
        println!("      {}", dim("content: not indexed"));
    }

    if status == IndexStatus::Missing {
        return;
    }
    match Snapshot::open(&root.index_location).and_then(|s| IndexStats::collect(&s)) {
        Ok(stats) => println!(
            "      {} files, {} directories, {} with content, {} degraded, {}",
            stats.files,
            stats.directories,
            stats.with_content,
            stats.degraded,
            format_size(stats.total_size)
        ),
        Err(e) => println!("      {}", warning(&format!("cannot read index: {e}"))),
    }
}
