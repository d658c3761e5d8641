//! Proxy configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! yields a working configuration:
//!
//! ```json
//! {
//!   "bind_addr": "127.0.0.1:5520",
//!   "idle_timeout": 30,
//!   "max_frame_size": 1677721600,
//!   "log_filter": "info"
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tessera_transport::MAX_PAYLOAD_SIZE;

/// Errors raised while loading a [`ProxyConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for the proxy server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Address the listener binds to.
    pub bind_addr: String,
    /// Seconds a connection may stay silent before it is closed.
    pub idle_timeout: u64,
    /// Largest frame payload accepted from or sent to a peer.
    pub max_frame_size: usize,
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5520".to_string(),
            idle_timeout: 30,
            max_frame_size: MAX_PAYLOAD_SIZE,
            log_filter: "info".to_string(),
        }
    }
}

impl ProxyConfig {
    /// Loads and checks a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout == 0 {
            return Err(ConfigError::Invalid("idle_timeout must be positive".into()));
        }
        if self.max_frame_size == 0 || self.max_frame_size > MAX_PAYLOAD_SIZE {
            return Err(ConfigError::Invalid(format!(
                "max_frame_size must be in 1..={MAX_PAYLOAD_SIZE}"
            )));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }
}
