//! Tracing subscriber setup

use rce_core::{LoggingConfig, RceError, Result};
use tracing_subscriber::EnvFilter;

/// Filter built from the configured directive, or from `RUST_LOG` when the
/// directive does not parse
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_new(&config.filter)
        .or_else(|_| EnvFilter::try_from_default_env())
        .map_err(|e| {
            RceError::invalid_config(format!("logging.filter '{}': {e}", config.filter))
        })
}

/// Install the global fmt subscriber
///
/// Calling this again once a subscriber is installed leaves it in place.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(config.with_target)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(filter = %config.filter, "Tracing initialised");
    }
    Ok(())
}
