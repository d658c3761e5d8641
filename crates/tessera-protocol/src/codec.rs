//! Turning frames into packets and back.
//!
//! [`PacketCodec`] is the only place where the three lower layers meet: it
//! resolves a frame's packet id in the [`PacketRegistry`], enforces that
//! packet's size cap, runs the payload through [`Compression`] when the
//! packet is flagged compressed, and hands the bytes to the record codec.
//!
//! On the inbound path the payload is always validated before anything is
//! decoded. A frame that fails any step is reported as a
//! [`ProtocolError`]; what to do about it (usually: drop the connection)
//! is the caller's decision.

use std::borrow::Cow;
use std::sync::Arc;

use serde::Serialize;
use tessera_codec::Record;
use tessera_transport::{MAX_PAYLOAD_SIZE, RawFrame};

use crate::{Compression, NoCompression, NoopStats, PacketId, PacketInfo, PacketRegistry, PacketStats, ProtocolError};

/// A decoded packet: its id and the record carried in the payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Packet {
    pub id: PacketId,
    pub record: Record,
}

impl Packet {
    pub fn new(id: i32, record: Record) -> Self {
        Self {
            id: PacketId(id),
            record,
        }
    }

    /// Schema name of the carried record.
    pub fn name(&self) -> &'static str {
        self.record.schema_name()
    }

    /// Renders the packet as a JSON object for logs and dumps.
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Encodes and decodes packets for one connection.
///
/// The registry is shared; the statistics are not. Give each connection
/// its own codec so its counters stay its own.
pub struct PacketCodec<S = NoopStats, C = NoCompression> {
    registry: Arc<PacketRegistry>,
    compression: C,
    stats: S,
    max_frame_size: usize,
}

impl PacketCodec {
    /// A codec with no statistics and no compression support.
    pub fn new(registry: Arc<PacketRegistry>) -> Self {
        Self {
            registry,
            compression: NoCompression,
            stats: NoopStats,
            max_frame_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl<S, C> PacketCodec<S, C> {
    /// Replaces the statistics sink.
    pub fn with_stats<T: PacketStats>(self, stats: T) -> PacketCodec<T, C> {
        PacketCodec {
            registry: self.registry,
            compression: self.compression,
            stats,
            max_frame_size: self.max_frame_size,
        }
    }

    /// Replaces the compression strategy.
    pub fn with_compression<D: Compression>(self, compression: D) -> PacketCodec<S, D> {
        PacketCodec {
            registry: self.registry,
            compression,
            stats: self.stats,
            max_frame_size: self.max_frame_size,
        }
    }

    /// Caps the on-wire payload of compressed packets, whose registered
    /// maximum applies to the decompressed size.
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max.min(MAX_PAYLOAD_SIZE);
        self
    }

    pub fn registry(&self) -> &Arc<PacketRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &S {
        &self.stats
    }

    pub fn into_stats(self) -> S {
        self.stats
    }
}

impl<S: PacketStats, C: Compression> PacketCodec<S, C> {
    /// Encodes a packet into a frame ready for the transport.
    ///
    /// # Errors
    /// - [`ProtocolError::UnknownPacket`] if the id is not registered
    /// - [`ProtocolError::Encode`] if the record does not fit the schema
    /// - [`ProtocolError::PayloadTooLarge`] if the encoded record exceeds
    ///   the packet's maximum
    pub fn encode(&mut self, packet: &Packet) -> Result<RawFrame, ProtocolError> {
        let info = self.lookup(packet.id)?;
        let bytes = info
            .schema
            .encode_to_vec(&packet.record)
            .map_err(|source| ProtocolError::Encode {
                packet: info.name,
                source,
            })?;
        check_len(&info, bytes.len(), info.max_size)?;

        let uncompressed = bytes.len();
        let payload = if info.compressed {
            let compressed = self.compression.compress(info.name, &bytes)?;
            check_len(&info, compressed.len(), self.max_frame_size)?;
            compressed
        } else {
            bytes
        };

        self.stats.record_send(info.id, uncompressed, payload.len());
        tracing::trace!(packet = info.name, id = %info.id, len = payload.len(), "encoded packet");
        Ok(RawFrame::new(info.id.0, payload))
    }

    /// Decodes a received frame.
    ///
    /// The payload is validated in full before any value is built.
    ///
    /// # Errors
    /// - [`ProtocolError::UnknownPacket`] if the id is not registered
    /// - [`ProtocolError::PayloadTooLarge`] if the payload exceeds the
    ///   packet's maximum
    /// - [`ProtocolError::Validation`] if the payload is malformed
    /// - compression errors for compressed packets
    pub fn decode(&mut self, frame: RawFrame) -> Result<Packet, ProtocolError> {
        let info = self.lookup(PacketId(frame.packet_id))?;

        let bytes: Cow<'_, [u8]> = if info.compressed {
            check_len(&info, frame.payload.len(), self.max_frame_size)?;
            Cow::Owned(
                self.compression
                    .decompress(info.name, &frame.payload, info.max_size)?,
            )
        } else {
            Cow::Borrowed(&frame.payload)
        };
        check_len(&info, bytes.len(), info.max_size)?;

        let invalid = |source| ProtocolError::Validation {
            packet: info.name,
            source,
        };
        info.schema.validate(&bytes, 0).map_err(invalid)?;
        let record = info.schema.decode(&bytes, 0).map_err(invalid)?;

        self.stats
            .record_receive(info.id, bytes.len(), frame.payload.len());
        tracing::trace!(packet = info.name, id = %info.id, len = frame.payload.len(), "decoded packet");
        Ok(Packet {
            id: info.id,
            record,
        })
    }

    fn lookup(&self, id: PacketId) -> Result<Arc<PacketInfo>, ProtocolError> {
        self.registry
            .by_id(id)
            .cloned()
            .ok_or(ProtocolError::UnknownPacket(id))
    }
}

fn check_len(info: &PacketInfo, len: usize, max: usize) -> Result<(), ProtocolError> {
    if len > max {
        return Err(ProtocolError::PayloadTooLarge {
            packet: info.name,
            len,
            max,
        });
    }
    Ok(())
}
