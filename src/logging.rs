//! Logging setup for the command-line tool.

use tracing_subscriber::EnvFilter;

/// Installs a `RUST_LOG`-driven subscriber (default `info`) writing to stderr,
/// leaving stdout to query output.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}
