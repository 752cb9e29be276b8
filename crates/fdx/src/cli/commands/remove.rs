//! Implementation of `fdx remove`.

use std::process::ExitCode;

use crate::cli::{args::RemoveCommand, context::CommandContext};

/// Forgets an indexed root and deletes its index.
///
/// The directory itself may already be gone.
pub fn run(ctx: &CommandContext, cmd: &RemoveCommand) -> ExitCode {
    let path = ctx.absolute(&cmd.dir);
    let root = path.canonicalize().unwrap_or(path);

    let lock = ctx.registry.root_lock(&root);
    let _guard = lock.lock();
    match ctx.registry.remove(&root) {
        Ok(removed) => {
            println!("Removed index for {}", removed.root_path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
