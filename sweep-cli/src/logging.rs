// Tracing subscriber setup for the CLI

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// Reads `RUST_LOG`, falling back to `info`. Logs go to stderr so they
/// interleave with the status output.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(Level::INFO.into())
            .parse_lossy("")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
