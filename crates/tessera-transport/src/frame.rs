//! Length-prefixed frames.
//!
//! ```text
//! ┌────────────────┬────────────────┬──────────────────────┐
//! │ payload_len    │ packet_id      │ payload              │
//! │ i32 LE         │ i32 LE         │ payload_len bytes    │
//! └────────────────┴────────────────┴──────────────────────┘
//! ```

use crate::TransportError;

/// Bytes before the payload: length then packet id.
pub const FRAME_HEADER_LEN: usize = 8;

/// Hard ceiling on any payload, regardless of configuration.
pub const MAX_PAYLOAD_SIZE: usize = 0x6400_0000;

/// One frame as it travels on the wire. The payload is opaque here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub packet_id: i32,
    pub payload: Vec<u8>,
}

impl RawFrame {
    pub fn new(packet_id: i32, payload: Vec<u8>) -> Self {
        Self { packet_id, payload }
    }

    /// Header plus payload, ready to write.
    ///
    /// Fails if the payload is larger than [`MAX_PAYLOAD_SIZE`].
    pub fn to_bytes(&self) -> Result<Vec<u8>, TransportError> {
        let header = encode_header(self.payload.len(), self.packet_id)?;
        let mut out = Vec::with_capacity(FRAME_HEADER_LEN + self.payload.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }
}

/// Builds a frame header for a payload of `payload_len` bytes.
pub fn encode_header(payload_len: usize, packet_id: i32) -> Result<[u8; FRAME_HEADER_LEN], TransportError> {
    check_payload_len(payload_len, MAX_PAYLOAD_SIZE)?;
    let len = i32::try_from(payload_len).map_err(|_| TransportError::FrameTooLarge {
        len: i64::try_from(payload_len).unwrap_or(i64::MAX),
        max: MAX_PAYLOAD_SIZE,
    })?;
    let mut header = [0u8; FRAME_HEADER_LEN];
    header[..4].copy_from_slice(&len.to_le_bytes());
    header[4..].copy_from_slice(&packet_id.to_le_bytes());
    Ok(header)
}

/// Parses a frame header, returning `(payload_len, packet_id)`.
///
/// Lengths that are negative or exceed `max` are rejected before any
/// payload is read.
pub fn parse_header(header: &[u8; FRAME_HEADER_LEN], max: usize) -> Result<(usize, i32), TransportError> {
    let len = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let packet_id = i32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let max = max.min(MAX_PAYLOAD_SIZE);
    match usize::try_from(len) {
        Ok(len) if len <= max => Ok((len, packet_id)),
        _ => Err(TransportError::FrameTooLarge {
            len: i64::from(len),
            max,
        }),
    }
}

/// Rejects outbound payloads the peer would refuse.
pub fn check_payload_len(len: usize, max: usize) -> Result<(), TransportError> {
    let max = max.min(MAX_PAYLOAD_SIZE);
    if len > max {
        return Err(TransportError::FrameTooLarge {
            len: i64::try_from(len).unwrap_or(i64::MAX),
            max,
        });
    }
    Ok(())
}
