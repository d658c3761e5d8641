//! Unsigned varints used for string lengths and collection counts.
//!
//! Seven payload bits per byte, low group first, high bit set on every byte
//! except the last. Lengths on this wire are signed 32-bit quantities, so a
//! varint is at most 5 bytes and must decode to `0..=i32::MAX`.

use crate::buffer::{ByteReader, ByteWriter};
use crate::error::{DecodeError, DecodeErrorKind, EncodeError, EncodeErrorKind};

/// Longest encoding of a 32-bit value.
pub const MAX_VARINT_LEN: usize = 5;

/// Largest length the wire can carry.
pub const MAX_WIRE_LENGTH: usize = i32::MAX as usize;

/// Appends `value` as a varint.
///
/// Fails with [`EncodeErrorKind::LengthOverflow`] for values the decoder
/// would reject.
pub fn write_varint(writer: &mut ByteWriter, value: usize) -> Result<(), EncodeError> {
    if value > MAX_WIRE_LENGTH {
        return Err(EncodeErrorKind::LengthOverflow { len: value }.into());
    }
    let mut value = value as u32;
    while value >= 0x80 {
        writer.write_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    writer.write_u8(value as u8);
    Ok(())
}

/// Decodes the varint at `offset` without consuming it.
pub fn peek_varint(reader: &ByteReader<'_>, offset: usize) -> Result<usize, DecodeError> {
    scan(reader, offset).map(|(value, _)| value)
}

/// Number of bytes the varint at `offset` occupies.
pub fn varint_len(reader: &ByteReader<'_>, offset: usize) -> Result<usize, DecodeError> {
    scan(reader, offset).map(|(_, len)| len)
}

/// Number of bytes `value` takes when written with [`write_varint`].
pub fn varint_size(value: usize) -> usize {
    match value {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0x0fff_ffff => 4,
        _ => 5,
    }
}

/// Returns `(value, encoded_len)` for the varint at `offset`.
pub(crate) fn scan(reader: &ByteReader<'_>, offset: usize) -> Result<(usize, usize), DecodeError> {
    let malformed = || DecodeError::new(DecodeErrorKind::MalformedLength { at: offset });
    let mut value: u64 = 0;
    for i in 0..MAX_VARINT_LEN {
        let pos = offset.checked_add(i).ok_or_else(malformed)?;
        let byte = reader.get_u8(pos).map_err(|_| malformed())?;
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            if value > MAX_WIRE_LENGTH as u64 {
                return Err(malformed());
            }
            return Ok((value as usize, i + 1));
        }
    }
    Err(malformed())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: usize) -> Vec<u8> {
        let mut w = ByteWriter::new();
        write_varint(&mut w, value).unwrap();
        w.into_inner()
    }

    #[test]
    fn test_known_encodings() {
        assert_eq!(encode(0), [0x00]);
        assert_eq!(encode(1), [0x01]);
        assert_eq!(encode(127), [0x7f]);
        assert_eq!(encode(128), [0x80, 0x01]);
        assert_eq!(encode(300), [0xac, 0x02]);
        assert_eq!(encode(i32::MAX as usize), [0xff, 0xff, 0xff, 0xff, 0x07]);
    }

    #[test]
    fn test_size_matches_written_length() {
        for value in [0, 127, 128, 16_383, 16_384, 2_097_151, 2_097_152, 268_435_455, 268_435_456] {
            assert_eq!(varint_size(value), encode(value).len(), "value {value}");
        }
    }

    #[test]
    fn test_peek_does_not_need_trailing_bytes() {
        let data = [0xac, 0x02, 0xde, 0xad];
        let r = ByteReader::new(&data);
        assert_eq!(peek_varint(&r, 0).unwrap(), 300);
        assert_eq!(varint_len(&r, 0).unwrap(), 2);
    }

    #[test]
    fn test_reject_value_above_i32_max() {
        let data = [0xff, 0xff, 0xff, 0xff, 0x0f];
        let r = ByteReader::new(&data);
        let err = peek_varint(&r, 0).unwrap_err();
        assert_eq!(err.kind(), &DecodeErrorKind::MalformedLength { at: 0 });
    }

    #[test]
    fn test_reject_overlong_varint() {
        let data = [0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        let r = ByteReader::new(&data);
        assert!(matches!(
            peek_varint(&r, 0).unwrap_err().kind(),
            DecodeErrorKind::MalformedLength { .. }
        ));
    }

    #[test]
    fn test_reject_truncated_varint() {
        let data = [0x05, 0x80];
        let r = ByteReader::new(&data);
        assert!(matches!(
            varint_len(&r, 1).unwrap_err().kind(),
            DecodeErrorKind::MalformedLength { at: 1 }
        ));
    }

    #[test]
    fn test_write_rejects_oversized_length() {
        let mut w = ByteWriter::new();
        let err = write_varint(&mut w, MAX_WIRE_LENGTH + 1).unwrap_err();
        assert!(matches!(err.kind(), EncodeErrorKind::LengthOverflow { .. }));
        assert_eq!(w.position(), 0);
    }
}
