//! Logging initialisation.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor a level is given.
pub const DEFAULT_LOG_FILTER: &str = "info,meridian=debug";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to set global subscriber: {0}")]
    SetSubscriber(String),
}

/// Build the log filter.
///
/// `RUST_LOG` wins, then `log_level`, then [`DEFAULT_LOG_FILTER`].
pub fn env_filter(log_level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(log_level.unwrap_or(DEFAULT_LOG_FILTER))
    })
}

/// Install the global fmt subscriber.
pub fn init_logging(log_level: Option<&str>) -> Result<(), TelemetryError> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(log_level))
        .with_target(true)
        .try_init()
        .map_err(|e| TelemetryError::SetSubscriber(e.to_string()))
}
