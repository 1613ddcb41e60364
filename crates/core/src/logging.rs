//! Structured logging infrastructure for LuminaFly.
//!
//! This module provides centralized logging initialization with support
//! for structured JSON output and environment-based configuration.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the logging system with structured output.
///
/// Log level can be configured via the `RUST_LOG` environment variable.
/// If not set, defaults to `info` level.
///
/// # Example
/// ```no_run
/// use luminafly_core::logging;
///
/// logging::init();
/// tracing::info!("Dispatcher started");
/// ```
pub fn init() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

/// Initialize the logging system with JSON output for production environments.
///
/// ```no_run
/// use luminafly_core::logging;
///
/// logging::init_json();
/// tracing::info!(service = "luminafly-node", "Service started");
/// ```
pub fn init_json() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .init();
}

/// Install a subscriber for tests; ignores the error if one is already set.
pub fn try_init_test() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_test_writer())
        .try_init();
}
