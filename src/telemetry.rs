//! Logging setup for binaries.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! the binary's job. Verbosity follows `RUST_LOG` (`info` when unset):
//!
//! - `RUST_LOG=info`: startup, shutdown, one line per request
//! - `RUST_LOG=debug`: plus client-error failures
//! - `RUST_LOG=rota=trace`: everything this crate emits

use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber filtered by `RUST_LOG`.
///
/// Calling it twice is harmless; the second call is ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
