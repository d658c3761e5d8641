//! Pluggable payload compression.
//!
//! Some packets are registered as compressed: their payload on the wire is
//! a compressed form of the record bytes. The packet codec does not know
//! any compression algorithm itself. It hands those payloads to a
//! [`Compression`] strategy, the same way it would swap any other codec
//! component.
//!
//! The default, [`NoCompression`], refuses compressed packets outright.

use crate::ProtocolError;

/// Compresses outbound and decompresses inbound payloads.
///
/// ## Trait bounds
///
/// `Send + Sync + 'static` so a strategy can live inside a connection task
/// that Tokio may move between threads.
pub trait Compression: Send + Sync + 'static {
    /// Compresses a freshly encoded record.
    fn compress(&self, packet: &'static str, data: &[u8]) -> Result<Vec<u8>, ProtocolError>;

    /// Decompresses a received payload.
    ///
    /// Implementations must stop and fail once the output would exceed
    /// `max_size`, so a small payload cannot expand without bound.
    fn decompress(&self, packet: &'static str, data: &[u8], max_size: usize) -> Result<Vec<u8>, ProtocolError>;
}

/// A [`Compression`] that supports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl Compression for NoCompression {
    fn compress(&self, packet: &'static str, _data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        Err(ProtocolError::CompressionUnsupported { packet })
    }

    fn decompress(&self, packet: &'static str, _data: &[u8], _max_size: usize) -> Result<Vec<u8>, ProtocolError> {
        Err(ProtocolError::CompressionUnsupported { packet })
    }
}
