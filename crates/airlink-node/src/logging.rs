//! Tracing subscriber configuration.
//!
//! Log levels follow these conventions:
//! - ERROR: unrecoverable failures (rx queue overflow, storage commit failure)
//! - WARN: recoverable drops (full event queue, timed-out requests)
//! - INFO: lifecycle events (engine start, pairing outcome, peer changes)
//! - DEBUG: protocol state changes (transfer start/complete, retries)
//! - TRACE: per-packet detail and discarded frames

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with sensible defaults.
///
/// Log level can be controlled via the `RUST_LOG` environment variable.
/// Defaults to `info` if not set.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Initialize the tracing subscriber for tests.
///
/// Uses `try_init` to avoid panicking if called multiple times.
pub fn init_for_tests() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
