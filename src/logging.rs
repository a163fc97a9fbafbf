//! Process-wide `tracing` setup.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber reading filter directives from
/// `RUST_LOG`, defaulting to `info` when unset.
///
/// Safe to call more than once; later calls are no-ops (the underlying
/// `set_global_default` error is swallowed since a subscriber is already
/// installed in that case, which is expected in tests).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}
