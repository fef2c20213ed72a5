//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset or invalid.
const DEFAULT_FILTER: &str = "info";

/// Initialize the tracing subscriber with environment-based filtering.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .try_init();
}
