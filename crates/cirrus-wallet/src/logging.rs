//! Tracing subscriber setup for hosts embedding the wallet engine.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::config::WalletConfig;
use crate::error::WalletError;

/// Install a global tracing subscriber with the given level and output format.
///
/// `RUST_LOG` takes precedence over `level` when set. Pass `format = "json"`
/// for structured JSON output; any other value gives human-readable text.
/// Fails if a global subscriber is already installed.
pub fn init_logging(level: &str, format: &str) -> Result<(), WalletError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .try_init()
    };
    result.map_err(|e| WalletError::Config(format!("logging: {e}")))
}

/// [`init_logging`] with the level and format from `config`.
pub fn init_from_config(config: &WalletConfig) -> Result<(), WalletError> {
    init_logging(&config.log_level, &config.log_format)
}
