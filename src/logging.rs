//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::{ApiscribeError, Result};

/// Install the global `tracing` subscriber
///
/// `RUST_LOG` wins over `default_directive` when set.
///
/// # Errors
///
/// Returns error if the directive is invalid or a subscriber is already
/// installed
pub fn init(default_directive: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive).map_err(|e| {
            ApiscribeError::ConfigError(format!("Invalid log level '{default_directive}': {e}"))
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| ApiscribeError::Other(format!("Failed to install logger: {e}")))
}
