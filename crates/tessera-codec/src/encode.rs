//! The write side: encoding records and predicting their size.
//!
//! Encoding writes the fixed block in one pass, reserving a slot per
//! variable field, then appends each present variable payload and backfills
//! its slot with the payload's offset from the variable block. Absent
//! fields get a cleared bit and a `-1` slot.

use std::collections::HashSet;

use crate::buffer::{ByteWriter, f16_to_f32, f32_to_f16};
use crate::error::{EncodeError, EncodeErrorKind};
use crate::offset::{RelativeOffset, VariableBlock};
use crate::schema::{Charset, FieldLayout, FieldType, RecordSchema};
use crate::value::{Record, Value};
use crate::varint::{varint_size, write_varint};

impl RecordSchema {
    /// Appends `record` to `writer`.
    ///
    /// On error nothing is left behind: the writer is truncated back to
    /// where it was.
    pub fn encode(&self, record: &Record, writer: &mut ByteWriter) -> Result<(), EncodeError> {
        let start = writer.position();
        write_record(self, record, writer).map_err(|e| {
            writer.truncate(start);
            e.within(self.name())
        })
    }

    /// Encodes `record` into a fresh buffer sized by [`encoded_size`](Self::encoded_size).
    pub fn encode_to_vec(&self, record: &Record) -> Result<Vec<u8>, EncodeError> {
        let mut writer = ByteWriter::with_capacity(self.encoded_size(record)?);
        self.encode(record, &mut writer)?;
        Ok(writer.into_inner())
    }

    /// Number of bytes [`encode`](Self::encode) would append.
    ///
    /// Fails on the same shape and length violations as `encode`. Checks
    /// that do not affect size (text content, enum range, half precision,
    /// key uniqueness) are left to `encode`.
    pub fn encoded_size(&self, record: &Record) -> Result<usize, EncodeError> {
        record_size(self, record).map_err(|e| e.within(self.name()))
    }
}

fn matched_values<'r>(
    schema: &RecordSchema,
    record: &'r Record,
) -> Result<&'r [(&'static str, Option<Value>)], EncodeError> {
    let values = record.values();
    let aligned = record.schema_name() == schema.name()
        && values.len() == schema.fields().len()
        && values.iter().zip(schema.fields()).all(|((name, _), f)| *name == f.name());
    if !aligned {
        return Err(EncodeErrorKind::SchemaMismatch {
            expected: schema.name().to_string(),
            found: record.schema_name().to_string(),
        }
        .into());
    }
    Ok(values)
}

fn write_record(schema: &RecordSchema, record: &Record, w: &mut ByteWriter) -> Result<(), EncodeError> {
    let values = matched_values(schema, record)?;
    let fields = || schema.fields().iter().zip(values.iter().map(|(_, v)| v));
    let start = w.position();

    let mut bits = vec![0u8; schema.nullable_bitfield_bytes()];
    for (field, value) in fields() {
        match (field.presence_bit(), value) {
            (Some(bit), Some(_)) => bits[bit / 8] |= 1 << (bit % 8),
            (None, None) => {
                return Err(EncodeError::from(EncodeErrorKind::MissingField).within(field.name()));
            }
            _ => {}
        }
    }
    w.write_bytes(&bits);

    for (field, value) in fields() {
        if let FieldLayout::Embedded { offset, size } = field.layout() {
            debug_assert_eq!(w.position() - start, offset);
            match value {
                Some(value) => write_value(field.ty(), value, w).map_err(|e| e.within(field.name()))?,
                None => w.write_zeros(size),
            }
        }
    }

    let indirect = || fields().filter(|(f, _)| matches!(f.layout(), FieldLayout::Indirect { .. }));
    let slots: Vec<_> = indirect().map(|_| w.reserve_i32_slot()).collect();
    let block = VariableBlock::new(start, schema.variable_block_start());
    debug_assert_eq!(w.position(), block.start());

    for ((field, value), slot) in indirect().zip(slots) {
        match value {
            Some(value) => {
                let cursor = w.position();
                let rel = block.relative(cursor).ok_or_else(|| {
                    EncodeError::from(EncodeErrorKind::LengthOverflow {
                        len: cursor - block.start(),
                    })
                    .within(field.name())
                })?;
                w.backfill(slot, rel.into_raw());
                write_value(field.ty(), value, w).map_err(|e| e.within(field.name()))?;
            }
            None => w.backfill(slot, RelativeOffset::ABSENT.into_raw()),
        }
    }

    let written = w.position() - start;
    if written > schema.max_encoded_size() {
        return Err(EncodeErrorKind::ValueTooLarge {
            len: written,
            max: schema.max_encoded_size(),
        }
        .into());
    }
    Ok(())
}

fn write_value(ty: &FieldType, value: &Value, w: &mut ByteWriter) -> Result<(), EncodeError> {
    match (ty, value) {
        (FieldType::Bool, Value::Bool(v)) => w.write_u8(u8::from(*v)),
        (FieldType::I8, Value::I8(v)) => w.write_i8(*v),
        (FieldType::U8, Value::U8(v)) => w.write_u8(*v),
        (FieldType::I16, Value::I16(v)) => w.write_i16_le(*v),
        (FieldType::U16, Value::U16(v)) => w.write_u16_le(*v),
        (FieldType::I32, Value::I32(v)) => w.write_i32_le(*v),
        (FieldType::U32, Value::U32(v)) => w.write_u32_le(*v),
        (FieldType::I64, Value::I64(v)) => w.write_i64_le(*v),
        (FieldType::U64, Value::U64(v)) => w.write_u64_le(*v),
        (FieldType::F16, Value::F32(v)) => {
            let half = f32_to_f16(*v);
            if !v.is_nan() && f16_to_f32(half) != *v {
                return Err(EncodeErrorKind::NotRepresentable { ty: "f16" }.into());
            }
            w.write_u16_le(half);
        }
        (FieldType::F32, Value::F32(v)) => w.write_f32_le(*v),
        (FieldType::F64, Value::F64(v)) => w.write_f64_le(*v),
        (FieldType::Enum(def), Value::Enum(v)) => {
            if def.variant(*v).is_none() {
                return Err(EncodeErrorKind::InvalidDiscriminant {
                    name: def.name,
                    value: *v,
                }
                .into());
            }
            w.write_u8(*v);
        }
        (FieldType::Uuid, Value::Uuid(v)) => w.write_bytes(v.as_bytes()),
        (FieldType::FixedAscii(n), Value::Text(s)) => {
            check_ascii(s)?;
            if s.contains('\0') {
                return Err(EncodeErrorKind::EmbeddedNul.into());
            }
            check_max(s.len(), *n)?;
            w.write_bytes(s.as_bytes());
            w.write_zeros(n - s.len());
        }
        (FieldType::FixedBytes(n), Value::Bytes(b)) => {
            check_exact(b.len(), *n)?;
            w.write_bytes(b);
        }
        (FieldType::Struct(schema) | FieldType::Record(schema), Value::Record(r)) => {
            write_record(schema, r, w)?;
        }
        (FieldType::String { max_len, charset }, Value::Text(s)) => {
            if *charset == Charset::Ascii {
                check_ascii(s)?;
            }
            check_max(s.len(), *max_len)?;
            write_varint(w, s.len())?;
            w.write_bytes(s.as_bytes());
        }
        (FieldType::Array { element, max_count }, Value::Array(items)) => {
            check_max(items.len(), *max_count)?;
            write_varint(w, items.len())?;
            for (i, item) in items.iter().enumerate() {
                write_value(element, item, w).map_err(|e| e.within(&format!("[{i}]")))?;
            }
        }
        (
            FieldType::Map {
                key,
                value: value_ty,
                max_count,
            },
            Value::Map(entries),
        ) => {
            check_max(entries.len(), *max_count)?;
            write_varint(w, entries.len())?;
            let mut seen = HashSet::with_capacity(entries.len());
            for (i, (k, v)) in entries.iter().enumerate() {
                let index = || format!("[{i}]");
                let key_start = w.position();
                write_value(key, k, w).map_err(|e| e.within(&index()))?;
                if !seen.insert(w.as_slice()[key_start..].to_vec()) {
                    return Err(
                        EncodeError::from(EncodeErrorKind::DuplicateKey { key: k.to_string() }).within(&index())
                    );
                }
                write_value(value_ty, v, w).map_err(|e| e.within(&index()))?;
            }
        }
        (expected, _) => {
            return Err(EncodeErrorKind::TypeMismatch {
                expected: expected.name(),
            }
            .into());
        }
    }
    Ok(())
}

fn record_size(schema: &RecordSchema, record: &Record) -> Result<usize, EncodeError> {
    let values = matched_values(schema, record)?;
    let mut size = schema.fixed_block_size();
    for (field, (_, value)) in schema.fields().iter().zip(values) {
        let within = |e: EncodeError| e.within(field.name());
        match (value, field.layout()) {
            (None, _) if field.presence_bit().is_none() => {
                return Err(within(EncodeErrorKind::MissingField.into()));
            }
            (None, _) => {}
            (Some(value), FieldLayout::Embedded { .. }) => {
                value_size(field.ty(), value).map_err(within)?;
            }
            (Some(value), FieldLayout::Indirect { .. }) => {
                size = size.saturating_add(value_size(field.ty(), value).map_err(within)?);
            }
        }
    }
    if size > schema.max_encoded_size() {
        return Err(EncodeErrorKind::ValueTooLarge {
            len: size,
            max: schema.max_encoded_size(),
        }
        .into());
    }
    Ok(size)
}

fn value_size(ty: &FieldType, value: &Value) -> Result<usize, EncodeError> {
    let size = match (ty, value) {
        (FieldType::Struct(schema) | FieldType::Record(schema), Value::Record(r)) => record_size(schema, r)?,
        (FieldType::FixedAscii(n), Value::Text(s)) => {
            check_max(s.len(), *n)?;
            *n
        }
        (FieldType::FixedBytes(n), Value::Bytes(b)) => {
            check_exact(b.len(), *n)?;
            *n
        }
        (FieldType::String { max_len, .. }, Value::Text(s)) => {
            check_max(s.len(), *max_len)?;
            varint_size(s.len()) + s.len()
        }
        (FieldType::Array { element, max_count }, Value::Array(items)) => {
            check_max(items.len(), *max_count)?;
            let mut total = varint_size(items.len());
            for (i, item) in items.iter().enumerate() {
                let item_size = value_size(element, item).map_err(|e| e.within(&format!("[{i}]")))?;
                total = total.saturating_add(item_size);
            }
            total
        }
        (
            FieldType::Map {
                key,
                value: value_ty,
                max_count,
            },
            Value::Map(entries),
        ) => {
            check_max(entries.len(), *max_count)?;
            let mut total = varint_size(entries.len());
            for (i, (k, v)) in entries.iter().enumerate() {
                let index = || format!("[{i}]");
                let key_size = value_size(key, k).map_err(|e| e.within(&index()))?;
                let value_size = value_size(value_ty, v).map_err(|e| e.within(&index()))?;
                total = total.saturating_add(key_size).saturating_add(value_size);
            }
            total
        }
        (ty, value) if is_scalar_match(ty, value) => ty.fixed_size().unwrap_or(0),
        (expected, _) => {
            return Err(EncodeErrorKind::TypeMismatch {
                expected: expected.name(),
            }
            .into());
        }
    };
    Ok(size)
}

fn is_scalar_match(ty: &FieldType, value: &Value) -> bool {
    matches!(
        (ty, value),
        (FieldType::Bool, Value::Bool(_))
            | (FieldType::I8, Value::I8(_))
            | (FieldType::U8, Value::U8(_))
            | (FieldType::I16, Value::I16(_))
            | (FieldType::U16, Value::U16(_))
            | (FieldType::I32, Value::I32(_))
            | (FieldType::U32, Value::U32(_))
            | (FieldType::I64, Value::I64(_))
            | (FieldType::U64, Value::U64(_))
            | (FieldType::F16 | FieldType::F32, Value::F32(_))
            | (FieldType::F64, Value::F64(_))
            | (FieldType::Enum(_), Value::Enum(_))
            | (FieldType::Uuid, Value::Uuid(_))
    )
}

fn check_max(len: usize, max: usize) -> Result<(), EncodeError> {
    if len > max {
        return Err(EncodeErrorKind::ValueTooLarge { len, max }.into());
    }
    Ok(())
}

fn check_exact(len: usize, expected: usize) -> Result<(), EncodeError> {
    if len != expected {
        return Err(EncodeErrorKind::LengthMismatch { len, expected }.into());
    }
    Ok(())
}

fn check_ascii(s: &str) -> Result<(), EncodeError> {
    if !s.is_ascii() {
        return Err(EncodeErrorKind::NonAscii.into());
    }
    Ok(())
}
