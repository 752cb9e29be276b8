//! Implementation of `fdx rebuild`.

use std::{process::ExitCode, time::Instant};

use fdx_index::IndexRoot;

use super::shared::{build_index, print_build_summary};
use crate::cli::{
    args::RebuildCommand,
    context::CommandContext,
    output::{dim, warning},
};

/// Rebuilds one indexed root, or every root, from a fresh scan.
///
/// Roots whose directory no longer exists are skipped with a warning. Any
/// failure makes the command fail after the remaining roots were attempted.
pub fn run(ctx: &CommandContext, cmd: &RebuildCommand) -> ExitCode {
    let targets: Vec<IndexRoot> = match &cmd.dir {
        Some(dir) => {
            let root = match ctx.resolve_root(dir) {
                Ok(root) => root,
                Err(code) => return code,
            };
            match ctx.registry.get(&root) {
                Some(registered) => vec![registered],
                None => {
                    eprintln!("error: {} is not indexed", root.display());
                    eprintln!("Run 'fdx index {}' first.", root.display());
                    return ExitCode::FAILURE;
                }
            }
        }
        None => ctx.registry.list(),
    };

    if targets.is_empty() {
        println!("{}", dim("No indexed directories."));
        return ExitCode::SUCCESS;
    }

    let mut failed = false;
    for target in &targets {
        if !target.root_path.is_dir() {
            println!(
                "{}",
                warning(&format!(
                    "skipping {}: directory no longer exists",
                    target.root_path.display()
                ))
            );
            continue;
        }
        let Ok(settings) = ctx.effective_settings(target) else {
            failed = true;
            continue;
        };
        let started = Instant::now();
        match build_index(ctx, &target.root_path, &settings) {
            Ok(built) => print_build_summary(&target.root_path, &built.stats, started.elapsed()),
            Err(_) => failed = true,
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
