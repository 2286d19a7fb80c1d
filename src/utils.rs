//! Small ambient helpers that don't belong to any one component.

use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber. `default_filter` is used
/// when `NIC_LOG` is unset; configuration-supplied filters (§A) are passed
/// straight through here at bootstrap.
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_env("NIC_LOG").unwrap_or_else(|_| EnvFilter::new(default_filter.to_owned()));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
