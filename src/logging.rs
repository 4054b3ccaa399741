//! Log setup. Everything goes to stderr so stdout carries only script output.

use tracing_subscriber::EnvFilter;

/// Default filter: `info` for this crate and `warn` for dependencies, or
/// `debug` for this crate when `verbose` is set.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "warn,selfheal=debug"
    } else {
        "warn,selfheal=info"
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the default filter.
pub fn init(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose).into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
