//! Tracing subscriber configuration for Reticulum nodes.
//!
//! Log levels follow these conventions:
//! - ERROR: Protocol violations, an interface disabled on an unsupported platform
//! - WARN: Recoverable I/O errors, missing multicast echo
//! - INFO: Lifecycle events (peer discovered, interface adopted, link established)
//! - DEBUG: Authentication mismatches, per-packet decisions, link state changes
//! - TRACE: Wire-level data

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` if set, otherwise `default_level`.
fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize the tracing subscriber.
///
/// Log level can be controlled via the `RUST_LOG` environment variable.
/// Falls back to `default_level` (the `[logging] level` setting) if not set.
pub fn init(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(default_level))
        .init();
}

/// Initialize the tracing subscriber with JSON output.
///
/// Activated by setting `RUST_LOG_FORMAT=json`.
pub fn init_json(default_level: &str) {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter(default_level))
        .init();
}

/// Pick the output format from `RUST_LOG_FORMAT` and initialize.
pub fn init_from_env(default_level: &str) {
    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        init_json(default_level);
    } else {
        init(default_level);
    }
}

/// Initialize the tracing subscriber for tests.
///
/// Uses `try_init` to avoid panicking if called multiple times.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("debug"))
        .with_test_writer()
        .try_init();
}
