//! Logging configuration for db-chores.
//!
//! Logs go to stderr so that stdout carries nothing but task results.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset. Quiet enough that a successful
/// run prints only its result.
const DEFAULT_FILTER: &str = "warn";

/// Initializes logging to stderr.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
