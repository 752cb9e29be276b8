//! Diagnostic logging setup.

use std::io;

use tracing_subscriber::EnvFilter;

/// Environment variable holding a log filter, e.g. `FDX_LOG=fdx_watch=debug`.
pub const LOG_ENV: &str = "FDX_LOG";

/// Returns the default filter directive for a `-v` count.
pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Installs a stderr subscriber.
///
/// An explicit `-v` wins over `FDX_LOG`; without one the environment filter
/// applies, falling back to warnings only.
pub fn init(verbose: u8) {
    let default = default_directive(verbose);
    let filter = if verbose > 0 {
        EnvFilter::new(default)
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
