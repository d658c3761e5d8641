//! Packet layer for Tessera.
//!
//! This crate sits between raw frames and application code:
//!
//! - **Registry** ([`PacketRegistry`], [`PacketInfo`]): which schema a
//!   packet id refers to, how large its payload may be, and whether it is
//!   compressed.
//! - **Codec** ([`PacketCodec`], [`Packet`]): frame to packet and back,
//!   with size caps and validate-before-decode.
//! - **Strategies** ([`Compression`], [`PacketStats`]): the pluggable
//!   parts of the codec, with do-nothing defaults.
//! - **Messages** ([`messages`]): the built-in schemas, registered by
//!   [`PacketRegistry::builtin`].
//!
//! # Architecture
//!
//! ```text
//! Transport (RawFrame) → Protocol (Packet) → Handler (application)
//! ```
//!
//! The protocol layer does not know about sockets. It takes a frame that
//! the transport already cut out of the byte stream and either produces a
//! fully validated [`Packet`] or a [`ProtocolError`] explaining why not.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use tessera_codec::{Record, Value};
//! use tessera_protocol::{Packet, PacketCodec, PacketId, PacketRegistry, messages};
//!
//! let mut codec = PacketCodec::new(Arc::new(PacketRegistry::builtin()));
//!
//! let mode = Record::new(&messages::SET_GAME_MODE).with("game_mode", Value::Enum(1));
//! let frame = codec.encode(&Packet::new(PacketId::SET_GAME_MODE.0, mode.clone()))?;
//! assert_eq!(frame.payload, [1]);
//!
//! let packet = codec.decode(frame)?;
//! assert_eq!(packet.record, mode);
//! # Ok::<(), tessera_protocol::ProtocolError>(())
//! ```
//!
//! # Feature Flags
//!
//! - `json` (default): [`Packet::to_json`] and [`ProtocolError::Json`]

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod compression;
mod error;
pub mod messages;
mod registry;
mod stats;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{Packet, PacketCodec};
pub use compression::{Compression, NoCompression};
pub use error::ProtocolError;
pub use registry::{PacketId, PacketInfo, PacketRegistry};
pub use stats::{ConnectionStats, DirectionStats, NoopStats, PacketStats, PacketStatsEntry};
