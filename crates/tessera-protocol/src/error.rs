//! Error types for the protocol layer.
//!
//! Every way an inbound frame can be refused has its own variant, so the
//! server can log precisely why it dropped a connection. The codec errors
//! from `tessera-codec` are carried as sources, keeping their field path.

use tessera_codec::{DecodeError, EncodeError};

use crate::PacketId;

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// No packet is registered under this id.
    #[error("unknown packet id {0}")]
    UnknownPacket(PacketId),

    /// The payload is larger than the packet's registered maximum.
    #[error("{packet}: payload of {len} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        packet: &'static str,
        len: usize,
        max: usize,
    },

    /// The payload failed structural validation.
    ///
    /// Nothing was decoded: validation runs before any value is built.
    #[error("{packet}: invalid payload: {source}")]
    Validation {
        packet: &'static str,
        #[source]
        source: DecodeError,
    },

    /// The outbound record does not fit its schema.
    #[error("{packet}: encode failed: {source}")]
    Encode {
        packet: &'static str,
        #[source]
        source: EncodeError,
    },

    /// The packet is flagged compressed but no compression is available.
    #[error("{packet}: compressed packets are not supported")]
    CompressionUnsupported { packet: &'static str },

    /// The compression strategy failed.
    #[error("{packet}: compression failed: {reason}")]
    Compression {
        packet: &'static str,
        reason: String,
    },

    /// Registering a packet whose id is already taken.
    #[error("packet id {id} already registered to {existing}")]
    DuplicatePacketId { id: PacketId, existing: &'static str },

    /// Registering a packet whose name is already taken.
    #[error("packet name {0} already registered")]
    DuplicatePacketName(&'static str),

    /// A packet's declared maximum cannot hold its fixed block.
    #[error("{packet}: max size {max} is below fixed block {fixed}")]
    MaxSizeTooSmall {
        packet: &'static str,
        max: usize,
        fixed: usize,
    },

    /// Rendering a packet as JSON failed.
    #[cfg(feature = "json")]
    #[error("json dump failed: {0}")]
    Json(#[from] serde_json::Error),
}
