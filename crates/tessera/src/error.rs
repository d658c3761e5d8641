//! Unified error type for Tessera.

use tessera_codec::SchemaError;
use tessera_protocol::ProtocolError;
use tessera_transport::TransportError;

use crate::config::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TesseraError {
    /// A schema declaration was rejected.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A transport-level error (bind, accept, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A packet could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The log filter directive did not parse.
    #[error("invalid log filter: {0}")]
    LogFilter(#[from] tracing_subscriber::filter::ParseError),

    /// The tracing subscriber could not be installed, usually because one
    /// already is.
    #[error("failed to install tracing subscriber")]
    Subscriber(#[source] Box<dyn std::error::Error + Send + Sync>),
}
