//! Bounds-aware byte views.
//!
//! [`ByteReader`] wraps an untrusted slice. Every read takes an absolute
//! offset and fails with [`DecodeErrorKind::BufferOverflow`] instead of
//! panicking, and [`ByteReader::readable_len`] is the only authority on how
//! far reads may go. The slice length *is* the readable extent: a caller
//! holding a larger allocation passes only the filled part.
//!
//! [`ByteWriter`] is append-only with one exception: slots reserved with
//! [`ByteWriter::reserve_i32_slot`] can be filled in later via
//! [`ByteWriter::backfill`]. That is how offset tables get written before
//! the variable block they point into.

use crate::error::{DecodeError, DecodeErrorKind};

/// Read-only view over a received record buffer.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    data: &'a [u8],
}

impl<'a> ByteReader<'a> {
    /// Wraps `data`; its length becomes the readable extent.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Number of bytes available for reading.
    pub fn readable_len(&self) -> usize {
        self.data.len()
    }

    /// Borrows `len` bytes starting at `offset`.
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = offset
            .checked_add(len)
            .ok_or(DecodeErrorKind::BufferOverflow {
                end: usize::MAX,
                readable: self.data.len(),
            })?;
        self.data.get(offset..end).ok_or_else(|| {
            DecodeErrorKind::BufferOverflow {
                end,
                readable: self.data.len(),
            }
            .into()
        })
    }

    fn array<const N: usize>(&self, offset: usize) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(offset, N)?);
        Ok(out)
    }

    pub fn get_u8(&self, offset: usize) -> Result<u8, DecodeError> {
        Ok(self.array::<1>(offset)?[0])
    }

    pub fn get_i8(&self, offset: usize) -> Result<i8, DecodeError> {
        Ok(i8::from_le_bytes(self.array(offset)?))
    }

    pub fn get_i16_le(&self, offset: usize) -> Result<i16, DecodeError> {
        Ok(i16::from_le_bytes(self.array(offset)?))
    }

    pub fn get_u16_le(&self, offset: usize) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.array(offset)?))
    }

    pub fn get_i32_le(&self, offset: usize) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.array(offset)?))
    }

    pub fn get_u32_le(&self, offset: usize) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array(offset)?))
    }

    pub fn get_i64_le(&self, offset: usize) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.array(offset)?))
    }

    pub fn get_u64_le(&self, offset: usize) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.array(offset)?))
    }

    pub fn get_f32_le(&self, offset: usize) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.array(offset)?))
    }

    pub fn get_f64_le(&self, offset: usize) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.array(offset)?))
    }

    /// Reads an IEEE 754 binary16 value and widens it to `f32`.
    pub fn get_f16_le(&self, offset: usize) -> Result<f32, DecodeError> {
        Ok(f16_to_f32(self.get_u16_le(offset)?))
    }
}

/// A 4-byte placeholder written by [`ByteWriter::reserve_i32_slot`].
///
/// The slot is consumed by [`ByteWriter::backfill`], so each reservation is
/// filled exactly once.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a reserved slot must be backfilled"]
pub struct DeferredSlot {
    position: usize,
}

impl DeferredSlot {
    /// Absolute position of the slot in the writer.
    pub fn position(&self) -> usize {
        self.position
    }
}

/// Append-only output buffer with deferred 4-byte slots.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-sizes the buffer, typically with a record's encoded size.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Current write cursor (number of bytes written so far).
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// Drops everything written after `position`.
    ///
    /// Used to roll back a record whose encoding failed part way.
    pub fn truncate(&mut self, position: usize) {
        self.buf.truncate(position);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i16_le(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u16_le(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32_le(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64_le(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32_le(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f64_le(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_zeros(&mut self, len: usize) {
        self.buf.resize(self.buf.len() + len, 0);
    }

    /// Appends a zeroed 4-byte placeholder and remembers where it is.
    pub fn reserve_i32_slot(&mut self) -> DeferredSlot {
        let position = self.buf.len();
        self.write_zeros(4);
        DeferredSlot { position }
    }

    /// Overwrites a reserved slot with its final little-endian value.
    pub fn backfill(&mut self, slot: DeferredSlot, value: i32) {
        self.buf[slot.position..slot.position + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// Widens an IEEE 754 binary16 bit pattern to `f32`.
pub fn f16_to_f32(half: u16) -> f32 {
    let sign = u32::from(half >> 15) << 31;
    let exp = u32::from((half >> 10) & 0x1f);
    let mant = u32::from(half & 0x3ff);

    let bits = match (exp, mant) {
        (0, 0) => sign,
        (0, _) => {
            // Subnormal: shift until the implicit bit (bit 10) is set.
            let shift = mant.leading_zeros() - 21;
            let mant = (mant << shift) & 0x3ff;
            sign | ((113 - shift) << 23) | (mant << 13)
        }
        (0x1f, _) => sign | 0x7f80_0000 | (mant << 13),
        _ => sign | ((exp + 112) << 23) | (mant << 13),
    };
    f32::from_bits(bits)
}

/// Narrows an `f32` to an IEEE 754 binary16 bit pattern.
///
/// Rounds to nearest with ties to even; values beyond the half range become
/// infinity, values below the smallest subnormal become signed zero.
pub fn f32_to_f16(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let mant = bits & 0x007f_ffff;

    if exp == 0xff {
        let payload = if mant != 0 { 0x200 | (mant >> 13) as u16 } else { 0 };
        return sign | 0x7c00 | payload;
    }

    let unbiased = exp - 127;
    if unbiased > 15 {
        return sign | 0x7c00;
    }
    if unbiased >= -14 {
        let mut half = (((unbiased + 15) as u32) << 10) | (mant >> 13);
        let rem = mant & 0x1fff;
        if rem > 0x1000 || (rem == 0x1000 && half & 1 == 1) {
            // A carry out of the mantissa bumps the exponent, up to infinity.
            half += 1;
        }
        return sign | half as u16;
    }
    if unbiased < -25 {
        return sign;
    }

    let full = mant | 0x0080_0000;
    let shift = (-unbiased - 1) as u32;
    let mut half = full >> shift;
    let rem = full & ((1 << shift) - 1);
    let halfway = 1 << (shift - 1);
    if rem > halfway || (rem == halfway && half & 1 == 1) {
        half += 1;
    }
    sign | half as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_reads_little_endian() {
        let data = [0x07, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff];
        let r = ByteReader::new(&data);
        assert_eq!(r.get_i32_le(0).unwrap(), 7);
        assert_eq!(r.get_i32_le(4).unwrap(), -1);
        assert_eq!(r.get_u16_le(4).unwrap(), 0xffff);
        assert_eq!(r.readable_len(), 8);
    }

    #[test]
    fn test_reader_rejects_read_past_extent() {
        let data = [1, 2, 3];
        let r = ByteReader::new(&data);
        let err = r.get_i32_le(0).unwrap_err();
        assert_eq!(
            err.kind(),
            &DecodeErrorKind::BufferOverflow {
                end: 4,
                readable: 3
            }
        );
    }

    #[test]
    fn test_reader_handles_offset_overflow() {
        let data = [0u8; 4];
        let r = ByteReader::new(&data);
        assert!(r.bytes(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_reserve_and_backfill_slot() {
        let mut w = ByteWriter::new();
        w.write_u8(0xaa);
        let slot = w.reserve_i32_slot();
        assert_eq!(slot.position(), 1);
        w.write_u8(0xbb);
        w.backfill(slot, -1);
        assert_eq!(w.as_slice(), &[0xaa, 0xff, 0xff, 0xff, 0xff, 0xbb]);
    }

    #[test]
    fn test_truncate_rolls_back() {
        let mut w = ByteWriter::new();
        w.write_u32_le(1);
        let mark = w.position();
        w.write_u64_le(2);
        w.truncate(mark);
        assert_eq!(w.position(), 4);
    }

    #[test]
    fn test_half_float_known_values() {
        assert_eq!(f32_to_f16(1.0), 0x3c00);
        assert_eq!(f32_to_f16(-2.0), 0xc000);
        assert_eq!(f32_to_f16(0.5), 0x3800);
        assert_eq!(f32_to_f16(65504.0), 0x7bff);
        assert_eq!(f32_to_f16(1.0e6), 0x7c00);
        assert_eq!(f32_to_f16(2f32.powi(-24)), 0x0001);
        assert_eq!(f32_to_f16(1.0e-10), 0x0000);

        assert_eq!(f16_to_f32(0x3c00), 1.0);
        assert_eq!(f16_to_f32(0xc000), -2.0);
        assert_eq!(f16_to_f32(0x7bff), 65504.0);
        assert_eq!(f16_to_f32(0x0001), 2f32.powi(-24));
        assert_eq!(f16_to_f32(0x0200), 2f32.powi(-15));
        assert!(f16_to_f32(0x7c00).is_infinite());
        assert!(f16_to_f32(0x7e00).is_nan());
    }

    #[test]
    fn test_half_float_rounds_to_nearest_even() {
        // 1 + 2^-11 sits exactly between 1.0 and the next half (1 + 2^-10).
        assert_eq!(f32_to_f16(1.0 + 2f32.powi(-11)), 0x3c00);
        // Slightly above the midpoint rounds up.
        assert_eq!(f32_to_f16(1.0 + 2f32.powi(-11) + 2f32.powi(-20)), 0x3c01);
    }
}
