//! Tracing subscriber setup for binaries.

use tracing_subscriber::EnvFilter;

use crate::TesseraError;

/// Installs a formatting subscriber for the whole process.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` (usually the
/// config's `log_filter`) applies. Fails if a subscriber is already
/// installed or the filter does not parse.
pub fn init(default_filter: &str) -> Result<(), TesseraError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(TesseraError::Subscriber)
}
