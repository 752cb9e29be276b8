//! Implementation of `fdx index`.

use std::{process::ExitCode, time::Instant};

use super::shared::{build_index, print_build_summary};
use crate::cli::{args::IndexCommand, context::CommandContext};

/// Indexes a directory tree, replacing any previous index of it.
pub fn run(ctx: &CommandContext, cmd: &IndexCommand) -> ExitCode {
    let root = match ctx.resolve_root(&cmd.dir) {
        Ok(root) => root,
        Err(code) => return code,
    };
    let mut settings = match ctx.config_for(&root) {
        Ok(config) => config.indexing,
        Err(code) => return code,
    };
    if cmd.filenames_only {
        settings.content = false;
    }

    let started = Instant::now();
    match build_index(ctx, &root, &settings) {
        Ok(built) => {
            print_build_summary(&root, &built.stats, started.elapsed());
            ExitCode::SUCCESS
        }
        Err(code) => code,
    }
}
