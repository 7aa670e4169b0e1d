//! Tracing setup
//!
//! Logs go to stderr; stdout is kept for the banner and dry-run commands.
//! The filter is read from `DEVSERVE_LOG`, then `RUST_LOG`.

use tracing_subscriber::EnvFilter;

/// Filter used when neither environment variable is set
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "devserve=debug" } else { "devserve=info" }
}

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env("DEVSERVE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Install the global subscriber. Safe to call more than once.
pub fn init(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
