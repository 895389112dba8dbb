//! Tracing subscriber setup for binaries

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber. `RUST_LOG` overrides `default_filter`.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .try_init();
}
