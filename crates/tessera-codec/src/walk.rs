//! The read side: one structural traversal behind validation, size
//! measurement, and decoding.
//!
//! All three walk a record the same way: check the fixed block is readable,
//! read the nullable bitmask, resolve each present variable field through
//! its offset slot, and recurse into strings, arrays, maps and nested
//! records. They differ only in what they produce at each step, which is
//! what [`Visitor`] abstracts:
//!
//! | visitor    | checks limits | produces          |
//! |------------|---------------|-------------------|
//! | `Measure`  | no            | byte count        |
//! | `Validate` | yes           | nothing           |
//! | `Build`    | yes           | [`Record`]        |
//!
//! Because `Validate` and `Build` share every bounds check, a buffer that
//! validates always decodes.

use std::collections::HashSet;

use uuid::Uuid;

use crate::buffer::ByteReader;
use crate::error::{DecodeError, DecodeErrorKind, ValidationError};
use crate::offset::{RelativeOffset, VariableBlock};
use crate::schema::{Charset, EnumDef, FieldLayout, FieldSpec, FieldType, RecordSchema};
use crate::value::{Record, Value};
use crate::varint;

/// Deepest nesting of records and collections the codec will follow.
pub const MAX_NESTING_DEPTH: usize = 64;

pub(crate) trait Visitor {
    type Out;
    type Fields;
    type Rec;

    /// Whether declared maxima, text encodings, discriminants, key
    /// uniqueness and slot/bitmask agreement are enforced.
    const CHECKS: bool;

    /// A fixed-width, non-struct value whose bytes are known to be readable.
    fn scalar(&mut self, ty: &FieldType, r: &ByteReader<'_>, pos: usize) -> Result<Self::Out, DecodeError>;
    fn text(&mut self, bytes: &[u8], charset: Charset) -> Result<Self::Out, DecodeError>;
    fn array(&mut self, items: Vec<Self::Out>) -> Self::Out;
    fn map(&mut self, entries: Vec<(Self::Out, Self::Out)>) -> Self::Out;
    fn fields(&mut self, capacity: usize) -> Self::Fields;
    fn push_field(&mut self, fields: &mut Self::Fields, value: Option<Self::Out>);
    fn record(&mut self, schema: &RecordSchema, fields: Self::Fields) -> Self::Rec;
    fn nest(&mut self, record: Self::Rec) -> Self::Out;
}

/// Structure-only walk. With `CHECKS` it is the validator; without, it
/// just measures.
pub(crate) struct Scan<const CHECKS: bool>;

pub(crate) type Measure = Scan<false>;
pub(crate) type Validate = Scan<true>;

impl<const C: bool> Visitor for Scan<C> {
    type Out = ();
    type Fields = ();
    type Rec = ();

    const CHECKS: bool = C;

    fn scalar(&mut self, ty: &FieldType, r: &ByteReader<'_>, pos: usize) -> Result<(), DecodeError> {
        if C { check_scalar(ty, r, pos) } else { Ok(()) }
    }

    fn text(&mut self, bytes: &[u8], charset: Charset) -> Result<(), DecodeError> {
        if C {
            decode_text(bytes, charset)?;
        }
        Ok(())
    }

    fn array(&mut self, _: Vec<()>) {}
    fn map(&mut self, _: Vec<((), ())>) {}
    fn fields(&mut self, _: usize) {}
    fn push_field(&mut self, _: &mut (), _: Option<()>) {}
    fn record(&mut self, _: &RecordSchema, _: ()) {}
    fn nest(&mut self, _: ()) {}
}

/// Materializes values.
pub(crate) struct Build;

impl Visitor for Build {
    type Out = Value;
    type Fields = Vec<Option<Value>>;
    type Rec = Record;

    const CHECKS: bool = true;

    fn scalar(&mut self, ty: &FieldType, r: &ByteReader<'_>, pos: usize) -> Result<Value, DecodeError> {
        read_scalar(ty, r, pos)
    }

    fn text(&mut self, bytes: &[u8], charset: Charset) -> Result<Value, DecodeError> {
        decode_text(bytes, charset).map(|s| Value::Text(s.to_owned()))
    }

    fn array(&mut self, items: Vec<Value>) -> Value {
        Value::Array(items)
    }

    fn map(&mut self, entries: Vec<(Value, Value)>) -> Value {
        Value::Map(entries)
    }

    fn fields(&mut self, capacity: usize) -> Vec<Option<Value>> {
        Vec::with_capacity(capacity)
    }

    fn push_field(&mut self, fields: &mut Vec<Option<Value>>, value: Option<Value>) {
        fields.push(value);
    }

    fn record(&mut self, schema: &RecordSchema, fields: Vec<Option<Value>>) -> Record {
        Record::from_parts(schema, fields)
    }

    fn nest(&mut self, record: Record) -> Value {
        Value::Record(record)
    }
}

impl RecordSchema {
    /// Checks that the record at `offset` can be decoded.
    ///
    /// Nothing outside `buffer[offset..]` is read and no values are built.
    pub fn validate(&self, buffer: &[u8], offset: usize) -> Result<(), ValidationError> {
        walk_record(&mut Validate {}, &ByteReader::new(buffer), offset, self, 0)
            .map(|_| ())
            .map_err(|e| e.within(self.name()))
    }

    /// Decodes the record at `offset`.
    pub fn decode(&self, buffer: &[u8], offset: usize) -> Result<Record, DecodeError> {
        self.decode_with_len(buffer, offset).map(|(record, _)| record)
    }

    /// Decodes the record at `offset` and reports how many bytes it spans.
    pub fn decode_with_len(&self, buffer: &[u8], offset: usize) -> Result<(Record, usize), DecodeError> {
        walk_record(&mut Build, &ByteReader::new(buffer), offset, self, 0).map_err(|e| e.within(self.name()))
    }

    /// Bytes the record at `offset` occupies: the fixed block plus the
    /// furthest end of any present variable field.
    ///
    /// Declared maxima are not enforced here; use [`validate`](Self::validate)
    /// first on untrusted input.
    pub fn consumed_bytes(&self, buffer: &[u8], offset: usize) -> Result<usize, DecodeError> {
        walk_record(&mut Measure {}, &ByteReader::new(buffer), offset, self, 0)
            .map(|(_, len)| len)
            .map_err(|e| e.within(self.name()))
    }
}

/// Where the record being walked sits, and which fields are present.
struct RecordFrame<'a> {
    start: usize,
    block: VariableBlock,
    bits: &'a [u8],
}

impl RecordFrame<'_> {
    fn is_present(&self, field: &FieldSpec) -> bool {
        field
            .presence_bit()
            .is_none_or(|bit| self.bits[bit / 8] & (1 << (bit % 8)) != 0)
    }
}

/// Walks one record, returning what the visitor built and the bytes spanned.
pub(crate) fn walk_record<V: Visitor>(
    v: &mut V,
    r: &ByteReader<'_>,
    start: usize,
    schema: &RecordSchema,
    depth: usize,
) -> Result<(V::Rec, usize), DecodeError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(DecodeErrorKind::NestingTooDeep { max: MAX_NESTING_DEPTH }.into());
    }
    let needed = schema.fixed_block_size();
    let available = r.readable_len().saturating_sub(start);
    if available < needed {
        return Err(DecodeErrorKind::TruncatedHeader { needed, available }.into());
    }

    let frame = RecordFrame {
        start,
        block: VariableBlock::new(start, schema.variable_block_start()),
        bits: r.bytes(start, schema.nullable_bitfield_bytes())?,
    };
    let mut end = frame.block.start();
    let mut fields = v.fields(schema.fields().len());
    for field in schema.fields() {
        let (value, field_end) =
            walk_field(v, r, &frame, field, depth).map_err(|e| e.within(field.name()))?;
        end = end.max(field_end);
        v.push_field(&mut fields, value);
    }

    let consumed = end - start;
    if V::CHECKS && consumed > schema.max_encoded_size() {
        return Err(DecodeErrorKind::ValueTooLarge {
            len: consumed,
            max: schema.max_encoded_size(),
        }
        .into());
    }
    Ok((v.record(schema, fields), consumed))
}

fn walk_field<V: Visitor>(
    v: &mut V,
    r: &ByteReader<'_>,
    frame: &RecordFrame<'_>,
    field: &FieldSpec,
    depth: usize,
) -> Result<(Option<V::Out>, usize), DecodeError> {
    let present = frame.is_present(field);
    match field.layout() {
        FieldLayout::Embedded { offset, .. } => {
            if !present {
                return Ok((None, 0));
            }
            let (out, _) = walk_value(v, r, frame.start + offset, field.ty(), depth + 1)?;
            Ok((Some(out), 0))
        }
        FieldLayout::Indirect { slot } => {
            let rel = RelativeOffset::from_raw(r.get_i32_le(frame.start + slot)?);
            if !present {
                if V::CHECKS && !rel.is_absent() {
                    return Err(DecodeErrorKind::InvalidOffset { offset: rel.into_raw() }.into());
                }
                return Ok((None, 0));
            }
            let pos = frame.block.resolve(rel, r.readable_len())?;
            let (out, end) = walk_value(v, r, pos, field.ty(), depth + 1)?;
            Ok((Some(out), end))
        }
    }
}

/// Walks one value at `pos`, returning the output and its end position.
fn walk_value<V: Visitor>(
    v: &mut V,
    r: &ByteReader<'_>,
    pos: usize,
    ty: &FieldType,
    depth: usize,
) -> Result<(V::Out, usize), DecodeError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(DecodeErrorKind::NestingTooDeep { max: MAX_NESTING_DEPTH }.into());
    }
    match ty {
        FieldType::Struct(schema) | FieldType::Record(schema) => {
            let (rec, consumed) = walk_record(v, r, pos, schema, depth)?;
            Ok((v.nest(rec), pos + consumed))
        }
        FieldType::String { max_len, charset } => {
            let (len, prefix) = read_length::<V>(r, pos, *max_len)?;
            let data = pos + prefix;
            let bytes = r.bytes(data, len)?;
            Ok((v.text(bytes, *charset)?, data + len))
        }
        FieldType::Array { element, max_count } => {
            let (count, prefix) = read_length::<V>(r, pos, *max_count)?;
            let mut cursor = pos + prefix;
            if let Some(size) = element.fixed_size() {
                let total = count.checked_mul(size).unwrap_or(usize::MAX);
                r.bytes(cursor, total)?;
                if !V::CHECKS {
                    return Ok((v.array(Vec::new()), cursor + total));
                }
            }
            let mut items = Vec::with_capacity(count.min(r.readable_len().saturating_sub(cursor)));
            for i in 0..count {
                let (item, next) = walk_value(v, r, cursor, element, depth + 1)
                    .map_err(|e| e.within(&format!("[{i}]")))?;
                items.push(item);
                cursor = next;
            }
            Ok((v.array(items), cursor))
        }
        FieldType::Map {
            key,
            value,
            max_count,
        } => {
            let (count, prefix) = read_length::<V>(r, pos, *max_count)?;
            let mut cursor = pos + prefix;
            let room = r.readable_len().saturating_sub(cursor);
            let mut seen = HashSet::new();
            let mut entries = Vec::with_capacity(count.min(room));
            for i in 0..count {
                let index = || format!("[{i}]");
                let (k, key_end) =
                    walk_value(v, r, cursor, key, depth + 1).map_err(|e| e.within(&index()))?;
                if V::CHECKS && !seen.insert(key_identity(r, key, cursor, key_end)?) {
                    let shown = render_key(r, key, cursor);
                    return Err(DecodeError::from(DecodeErrorKind::DuplicateKey { key: shown }).within(&index()));
                }
                let (val, value_end) =
                    walk_value(v, r, key_end, value, depth + 1).map_err(|e| e.within(&index()))?;
                entries.push((k, val));
                cursor = value_end;
            }
            Ok((v.map(entries), cursor))
        }
        scalar => {
            let size = scalar.fixed_size().unwrap_or(0);
            r.bytes(pos, size)?;
            Ok((v.scalar(scalar, r, pos)?, pos + size))
        }
    }
}

/// Reads a varint length prefix, enforcing `max` when the visitor checks.
fn read_length<V: Visitor>(r: &ByteReader<'_>, pos: usize, max: usize) -> Result<(usize, usize), DecodeError> {
    let (len, prefix) = varint::scan(r, pos)?;
    if V::CHECKS && len > max {
        return Err(DecodeErrorKind::ValueTooLarge { len, max }.into());
    }
    Ok((len, prefix))
}

/// The bytes that identify a map key. String keys skip their length
/// prefix so that two encodings of the same length compare equal.
fn key_identity<'a>(r: &ByteReader<'a>, ty: &FieldType, start: usize, end: usize) -> Result<&'a [u8], DecodeError> {
    let skip = match ty {
        FieldType::String { .. } => varint::varint_len(r, start)?,
        _ => 0,
    };
    r.bytes(start + skip, end - start - skip)
}

fn render_key(r: &ByteReader<'_>, ty: &FieldType, pos: usize) -> String {
    walk_value(&mut Build, r, pos, ty, 0)
        .map(|(key, _)| key.to_string())
        .unwrap_or_else(|_| String::from("?"))
}

fn check_discriminant(def: &EnumDef, value: u8) -> Result<(), DecodeError> {
    match def.variant(value) {
        Some(_) => Ok(()),
        None => Err(DecodeErrorKind::InvalidDiscriminant { name: def.name, value }.into()),
    }
}

fn decode_text(bytes: &[u8], charset: Charset) -> Result<&str, DecodeError> {
    let invalid = || DecodeError::from(DecodeErrorKind::InvalidText { charset: charset.name() });
    if charset == Charset::Ascii && !bytes.is_ascii() {
        return Err(invalid());
    }
    std::str::from_utf8(bytes).map_err(|_| invalid())
}

/// Fixed ASCII text ends at the first NUL.
fn fixed_ascii(bytes: &[u8]) -> Result<&str, DecodeError> {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    decode_text(&bytes[..end], Charset::Ascii)
}

fn check_scalar(ty: &FieldType, r: &ByteReader<'_>, pos: usize) -> Result<(), DecodeError> {
    match ty {
        FieldType::Enum(def) => check_discriminant(def, r.get_u8(pos)?),
        FieldType::FixedAscii(n) => fixed_ascii(r.bytes(pos, *n)?).map(|_| ()),
        _ => Ok(()),
    }
}

fn read_scalar(ty: &FieldType, r: &ByteReader<'_>, pos: usize) -> Result<Value, DecodeError> {
    Ok(match ty {
        FieldType::Bool => Value::Bool(r.get_u8(pos)? != 0),
        FieldType::I8 => Value::I8(r.get_i8(pos)?),
        FieldType::U8 => Value::U8(r.get_u8(pos)?),
        FieldType::I16 => Value::I16(r.get_i16_le(pos)?),
        FieldType::U16 => Value::U16(r.get_u16_le(pos)?),
        FieldType::I32 => Value::I32(r.get_i32_le(pos)?),
        FieldType::U32 => Value::U32(r.get_u32_le(pos)?),
        FieldType::I64 => Value::I64(r.get_i64_le(pos)?),
        FieldType::U64 => Value::U64(r.get_u64_le(pos)?),
        FieldType::F16 => Value::F32(r.get_f16_le(pos)?),
        FieldType::F32 => Value::F32(r.get_f32_le(pos)?),
        FieldType::F64 => Value::F64(r.get_f64_le(pos)?),
        FieldType::Enum(def) => {
            let value = r.get_u8(pos)?;
            check_discriminant(def, value)?;
            Value::Enum(value)
        }
        FieldType::Uuid => {
            let mut raw = [0u8; 16];
            raw.copy_from_slice(r.bytes(pos, 16)?);
            Value::Uuid(Uuid::from_bytes(raw))
        }
        FieldType::FixedAscii(n) => Value::Text(fixed_ascii(r.bytes(pos, *n)?)?.to_owned()),
        FieldType::FixedBytes(n) => Value::Bytes(r.bytes(pos, *n)?.to_vec()),
        FieldType::Struct(_)
        | FieldType::String { .. }
        | FieldType::Array { .. }
        | FieldType::Map { .. }
        | FieldType::Record(_) => unreachable!("composite types are walked structurally"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecordSchema {
        RecordSchema::builder("Sample")
            .nullable("id", FieldType::string(16))
            .required("count", FieldType::I32)
            .build()
            .unwrap()
    }

    // bits=0b01, count=7, slot=0, then "ab"
    const WITH_ID: [u8; 12] = [0x01, 7, 0, 0, 0, 0, 0, 0, 0, 2, b'a', b'b'];

    // =========================================================================
    // Decoding
    // =========================================================================

    #[test]
    fn test_decode_present_string() {
        let record = sample().decode(&WITH_ID, 0).unwrap();
        assert_eq!(record.get("id").and_then(Value::as_str), Some("ab"));
        assert_eq!(record.get("count"), Some(&Value::I32(7)));
    }

    #[test]
    fn test_decode_at_nonzero_offset() {
        let mut buf = vec![0xee; 5];
        buf.extend_from_slice(&WITH_ID);
        let record = sample().decode(&buf, 5).unwrap();
        assert_eq!(record.get("id").and_then(Value::as_str), Some("ab"));
        assert_eq!(sample().consumed_bytes(&buf, 5).unwrap(), 12);
    }

    #[test]
    fn test_decode_with_len() {
        let (_, len) = sample().decode_with_len(&WITH_ID, 0).unwrap();
        assert_eq!(len, WITH_ID.len());
    }

    // =========================================================================
    // Validation failures
    // =========================================================================

    #[test]
    fn test_truncated_header() {
        let err = sample().validate(&WITH_ID[..6], 0).unwrap_err();
        assert_eq!(
            err.kind(),
            &DecodeErrorKind::TruncatedHeader {
                needed: 9,
                available: 6
            }
        );
        assert_eq!(err.field(), "Sample");
    }

    #[test]
    fn test_slot_set_while_bit_clear_is_invalid() {
        let mut buf = WITH_ID;
        buf[0] = 0;
        let err = sample().validate(&buf, 0).unwrap_err();
        assert_eq!(err.kind(), &DecodeErrorKind::InvalidOffset { offset: 0 });
        assert_eq!(err.field(), "Sample.id");
    }

    #[test]
    fn test_negative_slot_for_present_field() {
        let mut buf = WITH_ID;
        buf[5..9].copy_from_slice(&(-5i32).to_le_bytes());
        let err = sample().validate(&buf, 0).unwrap_err();
        assert_eq!(err.kind(), &DecodeErrorKind::InvalidOffset { offset: -5 });
    }

    #[test]
    fn test_slot_beyond_extent() {
        let mut buf = WITH_ID;
        buf[5..9].copy_from_slice(&40i32.to_le_bytes());
        let err = sample().validate(&buf, 0).unwrap_err();
        assert!(matches!(err.kind(), DecodeErrorKind::OffsetOutOfBounds { position: 49, .. }));
    }

    #[test]
    fn test_string_overruns_buffer() {
        let err = sample().validate(&WITH_ID[..11], 0).unwrap_err();
        assert!(matches!(err.kind(), DecodeErrorKind::BufferOverflow { end: 12, readable: 11 }));
    }

    #[test]
    fn test_string_over_declared_max() {
        let mut buf = WITH_ID.to_vec();
        buf[9] = 17;
        buf.resize(10 + 17, b'x');
        let err = sample().validate(&buf, 0).unwrap_err();
        assert_eq!(err.kind(), &DecodeErrorKind::ValueTooLarge { len: 17, max: 16 });
        // Measuring does not enforce maxima.
        assert_eq!(sample().consumed_bytes(&buf, 0).unwrap(), 27);
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buf = WITH_ID;
        buf[10] = 0xff;
        let err = sample().validate(&buf, 0).unwrap_err();
        assert_eq!(err.kind(), &DecodeErrorKind::InvalidText { charset: "UTF-8" });
        assert!(sample().decode(&buf, 0).is_err());
    }

    #[test]
    fn test_invalid_discriminant() {
        const MODE: EnumDef = EnumDef::new("GameMode", &["Adventure", "Creative"]);
        let schema = RecordSchema::builder("SetGameMode")
            .required("mode", FieldType::Enum(MODE))
            .build()
            .unwrap();
        assert!(schema.validate(&[1], 0).is_ok());
        let err = schema.validate(&[2], 0).unwrap_err();
        assert_eq!(
            err.kind(),
            &DecodeErrorKind::InvalidDiscriminant {
                name: "GameMode",
                value: 2
            }
        );
    }

    #[test]
    fn test_fixed_ascii_stops_at_nul() {
        let schema = RecordSchema::builder("Hash")
            .required("hash", FieldType::FixedAscii(6))
            .build()
            .unwrap();
        let record = schema.decode(b"abc\0\0\0", 0).unwrap();
        assert_eq!(record.get("hash").and_then(Value::as_str), Some("abc"));
    }

    // =========================================================================
    // Collections
    // =========================================================================

    fn scores() -> RecordSchema {
        RecordSchema::builder("Scores")
            .nullable("by_id", FieldType::map(FieldType::I32, FieldType::U8, 3))
            .build()
            .unwrap()
    }

    fn map_buffer(keys: &[i32]) -> Vec<u8> {
        let mut buf = vec![0x01, 0, 0, 0, 0, keys.len() as u8];
        for key in keys {
            buf.extend_from_slice(&key.to_le_bytes());
            buf.push(9);
        }
        buf
    }

    #[test]
    fn test_map_with_unique_keys() {
        let record = scores().decode(&map_buffer(&[1, 2, 3]), 0).unwrap();
        let entries = record.get("by_id").and_then(Value::as_map).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2], (Value::I32(3), Value::U8(9)));
    }

    #[test]
    fn test_map_duplicate_key_names_the_key() {
        let err = scores().validate(&map_buffer(&[1, 2, 2]), 0).unwrap_err();
        assert_eq!(err.kind(), &DecodeErrorKind::DuplicateKey { key: "2".into() });
        assert_eq!(err.field(), "Scores.by_id[2]");
    }

    #[test]
    fn test_map_count_over_max() {
        let err = scores().validate(&map_buffer(&[1, 2, 3, 4]), 0).unwrap_err();
        assert_eq!(err.kind(), &DecodeErrorKind::ValueTooLarge { len: 4, max: 3 });
    }

    #[test]
    fn test_fixed_array_checks_span_in_one_step() {
        let schema = RecordSchema::builder("Blob")
            .required("data", FieldType::array(FieldType::I64, 1000))
            .build()
            .unwrap();
        // slot=0, count=100, but only 8 bytes of payload.
        let mut buf = vec![0, 0, 0, 0, 100];
        buf.extend_from_slice(&[0; 8]);
        let err = schema.validate(&buf, 0).unwrap_err();
        assert!(matches!(err.kind(), DecodeErrorKind::BufferOverflow { end: 805, .. }));
    }

    #[test]
    fn test_malformed_length_prefix() {
        let buf = [0x01, 0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        let err = scores().validate(&buf, 0).unwrap_err();
        assert_eq!(err.kind(), &DecodeErrorKind::MalformedLength { at: 5 });
    }
}
