//! Minimal tracing setup for command-line tools.

use tracing_subscriber::EnvFilter;

/// Install a compact subscriber writing to stderr, so stdout stays free for
/// command output.
///
/// `RUST_LOG` wins over `default_filter` when set.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
