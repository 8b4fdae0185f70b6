//! Subscriber setup for binaries built on ironlink.

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered at `level` (e.g. `"info"`,
/// `"ironlink=debug"`). `RUST_LOG`, when set, takes precedence.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case nothing changes.
pub fn init(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
