//! # Tessera
//!
//! A validating proxy for binary game protocols.
//!
//! Tessera accepts TCP connections carrying length-prefixed frames,
//! validates every payload against its registered record schema before
//! decoding it, and hands the decoded [`Packet`](tessera_protocol::Packet)
//! to a [`PacketHandler`]. A peer that sends anything malformed is
//! disconnected.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tessera::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), TesseraError> {
//!     let config = ProxyConfig::default();
//!     tessera::telemetry::init(&config.log_filter)?;
//!     TesseraServer::builder()
//!         .config(config)
//!         .handler(EchoHandler)
//!         .build()
//!         .await?
//!         .run()
//!         .await
//! }
//! ```
//!
//! The layers are also usable on their own: `tessera_codec` for records,
//! `tessera_protocol` for packets and `tessera_transport` for framed TCP.

mod config;
mod error;
mod handler;
mod server;
pub mod telemetry;

pub use config::{ConfigError, ProxyConfig};
pub use error::TesseraError;
pub use handler::{EchoHandler, Outcome, PacketHandler};
pub use server::{TesseraServer, TesseraServerBuilder};

pub use tessera_codec as codec;
pub use tessera_protocol as protocol;
pub use tessera_transport as transport;

/// Everything needed to run a server and write a handler.
pub mod prelude {
    pub use crate::{
        ConfigError, EchoHandler, Outcome, PacketHandler, ProxyConfig, TesseraError, TesseraServer,
        TesseraServerBuilder,
    };
    pub use tessera_codec::{FieldType, Record, RecordSchema, Value};
    pub use tessera_protocol::{Packet, PacketCodec, PacketId, PacketInfo, PacketRegistry, messages};
    pub use tessera_transport::{Connection, ConnectionId, RawFrame, TcpConnection};
}
