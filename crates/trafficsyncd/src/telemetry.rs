//! Logging setup for processes embedding the synchronizer.

use crate::config_file::LoggingConfig;
use crate::error::{Result, SyncError};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG`, when set, overrides the configured level. Fails if a global
/// subscriber is already installed or the filter does not parse.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            SyncError::Configuration(format!("Invalid log level '{}': {}", config.level, e))
        })?,
    };

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let installed = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.compact().finish())
    };
    installed.map_err(|e| SyncError::Configuration(format!("Failed to set logger: {}", e)))
}
