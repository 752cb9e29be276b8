//! Command implementations and dispatch.

pub mod config;
pub mod index;
pub mod list;
pub mod rebuild;
pub mod remove;
pub mod search;
mod shared;
pub mod status;
pub mod watch;

use std::process::ExitCode;

use super::{args::Commands, context::CommandContext};

/// Dispatches to the selected subcommand.
pub fn run(command: Commands, ctx: &CommandContext) -> ExitCode {
    match command {
        Commands::Index(cmd) => index::run(ctx, &cmd),
        Commands::Search(cmd) => search::run(ctx, &cmd),
        Commands::Watch(cmd) => watch::run(ctx, &cmd),
        Commands::List => list::run(ctx),
        Commands::Remove(cmd) => remove::run(ctx, &cmd),
        Commands::Rebuild(cmd) => rebuild::run(ctx, &cmd),
        Commands::Status => status::run(ctx),
        Commands::Config => config::run(ctx),
    }
}
