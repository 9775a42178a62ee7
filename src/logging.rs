//! Tracing subscriber setup for the `fsearch` binary.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "folder_search=info";

/// Install the global subscriber. `RUST_LOG` overrides the default
/// `folder_search=info` filter. Calling this twice is harmless.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
