//! Logging setup utilities for the Comlink chat client.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the specified default log level.
///
/// The filter covers the client library crate and the binary. It can be
/// overridden using the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "comlink_client")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use comlink_shared::logger::setup_logger;
///
/// setup_logger("comlink_client", "info");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_ansi(true))
        .init();
}

/// Build the default `EnvFilter` directive string.
fn default_filter(binary_name: &str, default_log_level: &str) -> String {
    format!(
        "comlink_client={},comlink_shared={},{}={}",
        default_log_level,
        default_log_level,
        binary_name.replace('-', "_"),
        default_log_level
    )
}
