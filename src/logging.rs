//! Subscriber setup for the `tracing` events the index emits.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::config::Settings;
use crate::error::{IndexError, IndexResult};

/// Resolves the level from settings. `debug = true` wins over `log_level`.
pub fn level_from_settings(settings: &Settings) -> IndexResult<Level> {
    if settings.debug {
        return Ok(Level::DEBUG);
    }
    Level::from_str(&settings.log_level).map_err(|_| IndexError::ConfigError {
        reason: format!(
            "log_level must be one of trace, debug, info, warn, error; got {:?}",
            settings.log_level
        ),
    })
}

/// Installs a global fmt subscriber at the configured level.
///
/// # Errors
/// `ConfigError` for an unknown level or when a global subscriber is
/// already installed.
pub fn init(settings: &Settings) -> IndexResult<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level_from_settings(settings)?)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).map_err(|e| IndexError::ConfigError {
        reason: format!("logging already initialized: {e}"),
    })
}
