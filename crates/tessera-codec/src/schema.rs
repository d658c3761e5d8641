//! Record schemas and the layout rules derived from them.
//!
//! A schema is a declaration-ordered list of fields. Everything about where
//! bytes live on the wire follows from that list:
//!
//! ```text
//! ┌──────────────┬────────────────────────┬───────────────────┬──────────────────┐
//! │ nullable bits│ fixed-width fields     │ offset table      │ variable block   │
//! │ ceil(n/8) B  │ declaration order      │ 4 B per var field │ payloads         │
//! └──────────────┴────────────────────────┴───────────────────┴──────────────────┘
//! │◄──────────────────── fixed block ─────────────────────────►│
//! ```
//!
//! - Fixed-width fields are embedded at a static offset. A nullable one gets
//!   a presence bit and is zero-filled when absent.
//! - Variable-width fields (strings, arrays, maps, records) get a 4-byte
//!   slot holding an offset relative to the variable block. A nullable one
//!   also gets a presence bit; a required one is always present.
//! - Presence bits are assigned to nullable fields in declaration order,
//!   least significant bit first.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::SchemaError;
use crate::varint::{MAX_WIRE_LENGTH, varint_size};

/// Text encoding of a string field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    /// 7-bit ASCII; bytes `>= 0x80` are rejected.
    Ascii,
}

impl Charset {
    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Ascii => "ASCII",
        }
    }
}

/// A one-byte enumeration: discriminant `i` names `variants[i]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumDef {
    pub name: &'static str,
    pub variants: &'static [&'static str],
}

impl EnumDef {
    pub const fn new(name: &'static str, variants: &'static [&'static str]) -> Self {
        Self { name, variants }
    }

    /// Variant name for a discriminant, if it exists.
    pub fn variant(&self, value: u8) -> Option<&'static str> {
        self.variants.get(usize::from(value)).copied()
    }

    /// Discriminant for a variant name.
    pub fn discriminant(&self, variant: &str) -> Option<u8> {
        self.variants
            .iter()
            .position(|v| *v == variant)
            .and_then(|i| u8::try_from(i).ok())
    }
}

/// The wire type of a field, array element, or map key/value.
#[derive(Debug, Clone)]
pub enum FieldType {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    /// IEEE 754 half precision, widened to `f32` in memory. Encoding
    /// refuses an `f32` that would not survive the narrowing.
    F16,
    F32,
    F64,
    Enum(EnumDef),
    /// 16 bytes in RFC 4122 byte order.
    Uuid,
    /// NUL-padded ASCII text of exactly `n` bytes. The text itself may not
    /// contain NUL.
    FixedAscii(usize),
    /// Raw bytes; the value must be exactly `n` bytes long.
    FixedBytes(usize),
    /// A nested record with no variable fields, embedded in place.
    Struct(Arc<RecordSchema>),
    /// Varint byte length followed by text.
    String { max_len: usize, charset: Charset },
    /// Varint count followed by elements.
    Array {
        element: Box<FieldType>,
        max_count: usize,
    },
    /// Varint count followed by key/value pairs; keys are unique.
    Map {
        key: Box<FieldType>,
        value: Box<FieldType>,
        max_count: usize,
    },
    /// A self-describing nested record in the variable block. Its schema
    /// must have at least one field.
    Record(Arc<RecordSchema>),
}

impl FieldType {
    /// UTF-8 string of at most `max_len` bytes.
    pub fn string(max_len: usize) -> Self {
        Self::String {
            max_len,
            charset: Charset::Utf8,
        }
    }

    /// ASCII string of at most `max_len` bytes.
    pub fn ascii(max_len: usize) -> Self {
        Self::String {
            max_len,
            charset: Charset::Ascii,
        }
    }

    pub fn array(element: FieldType, max_count: usize) -> Self {
        Self::Array {
            element: Box::new(element),
            max_count,
        }
    }

    pub fn map(key: FieldType, value: FieldType, max_count: usize) -> Self {
        Self::Map {
            key: Box::new(key),
            value: Box::new(value),
            max_count,
        }
    }

    /// Encoded size for fixed-width types, `None` for variable-width ones.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::Bool | Self::I8 | Self::U8 | Self::Enum(_) => Some(1),
            Self::I16 | Self::U16 | Self::F16 => Some(2),
            Self::I32 | Self::U32 | Self::F32 => Some(4),
            Self::I64 | Self::U64 | Self::F64 => Some(8),
            Self::Uuid => Some(16),
            Self::FixedAscii(n) | Self::FixedBytes(n) => Some(*n),
            Self::Struct(schema) => Some(schema.fixed_block_size()),
            Self::String { .. } | Self::Array { .. } | Self::Map { .. } | Self::Record(_) => None,
        }
    }

    /// Short type name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F16 => "f16",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Enum(_) => "enum",
            Self::Uuid => "uuid",
            Self::FixedAscii(_) => "fixed ascii",
            Self::FixedBytes(_) => "fixed bytes",
            Self::Struct(_) => "struct",
            Self::String { .. } => "string",
            Self::Array { .. } => "array",
            Self::Map { .. } => "map",
            Self::Record(_) => "record",
        }
    }

    /// Largest number of bytes a value of this type can encode to,
    /// saturating at the wire's length limit.
    pub fn max_size(&self) -> usize {
        let bounded = |n: usize| n.min(MAX_WIRE_LENGTH);
        match self {
            Self::String { max_len, .. } => bounded(varint_size(*max_len).saturating_add(*max_len)),
            Self::Array { element, max_count } => bounded(
                varint_size(*max_count).saturating_add(max_count.saturating_mul(element.max_size())),
            ),
            Self::Map {
                key,
                value,
                max_count,
            } => bounded(varint_size(*max_count).saturating_add(
                max_count.saturating_mul(key.max_size().saturating_add(value.max_size())),
            )),
            Self::Record(schema) => schema.max_encoded_size(),
            fixed => fixed.fixed_size().unwrap_or(0),
        }
    }

    /// Map keys compare by their encoded bytes, so only types whose
    /// encoding is one-to-one with their value may be keys.
    fn is_valid_map_key(&self) -> bool {
        matches!(
            self,
            Self::I8
                | Self::U8
                | Self::I16
                | Self::U16
                | Self::I32
                | Self::U32
                | Self::I64
                | Self::U64
                | Self::Enum(_)
                | Self::Uuid
                | Self::FixedBytes(_)
                | Self::String { .. }
        )
    }
}

/// A field as declared: name, type, and whether it may be absent.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub nullable: bool,
}

/// How a field is reached inside the fixed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLayout {
    /// Value bytes sit at `offset` from the record start.
    Embedded { offset: usize, size: usize },
    /// A relative-offset slot sits at `slot` from the record start.
    Indirect { slot: usize },
}

/// Layout category of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    FixedScalar,
    FixedStruct,
    NullableFixed,
    Variable,
}

/// A field together with its computed position.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    field: Field,
    layout: FieldLayout,
    presence_bit: Option<usize>,
}

impl FieldSpec {
    pub fn name(&self) -> &'static str {
        self.field.name
    }

    pub fn ty(&self) -> &FieldType {
        &self.field.ty
    }

    pub fn is_nullable(&self) -> bool {
        self.field.nullable
    }

    pub fn layout(&self) -> FieldLayout {
        self.layout
    }

    /// Index into the nullable bitmask, for nullable fields.
    pub fn presence_bit(&self) -> Option<usize> {
        self.presence_bit
    }

    pub fn kind(&self) -> FieldKind {
        match (&self.layout, &self.field.ty, self.field.nullable) {
            (FieldLayout::Indirect { .. }, _, _) => FieldKind::Variable,
            (FieldLayout::Embedded { .. }, _, true) => FieldKind::NullableFixed,
            (FieldLayout::Embedded { .. }, FieldType::Struct(_), false) => FieldKind::FixedStruct,
            (FieldLayout::Embedded { .. }, _, false) => FieldKind::FixedScalar,
        }
    }
}

/// The immutable description of one record shape.
///
/// Built once with [`RecordSchema::builder`] and shared behind an [`Arc`].
#[derive(Debug, Clone)]
pub struct RecordSchema {
    name: &'static str,
    fields: Vec<FieldSpec>,
    nullable_bitfield_bytes: usize,
    fixed_block_size: usize,
    variable_field_count: usize,
    max_encoded_size: usize,
}

impl RecordSchema {
    pub fn builder(name: &'static str) -> RecordSchemaBuilder {
        RecordSchemaBuilder {
            name,
            fields: Vec::new(),
            max_encoded_size: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn nullable_bitfield_bytes(&self) -> usize {
        self.nullable_bitfield_bytes
    }

    /// Bitmask, embedded fields, and offset table together.
    pub fn fixed_block_size(&self) -> usize {
        self.fixed_block_size
    }

    pub fn variable_field_count(&self) -> usize {
        self.variable_field_count
    }

    /// Offset of the variable block from the record start.
    pub fn variable_block_start(&self) -> usize {
        self.fixed_block_size
    }

    pub fn max_encoded_size(&self) -> usize {
        self.max_encoded_size
    }

    /// `true` when every value of this record has the same encoded size.
    pub fn is_fixed_size(&self) -> bool {
        self.variable_field_count == 0
    }
}

impl fmt::Display for RecordSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (fixed {} B, {} variable, max {} B)",
            self.name, self.fixed_block_size, self.variable_field_count, self.max_encoded_size
        )
    }
}

/// Collects field declarations and computes the layout.
#[derive(Debug, Clone)]
pub struct RecordSchemaBuilder {
    name: &'static str,
    fields: Vec<Field>,
    max_encoded_size: Option<usize>,
}

impl RecordSchemaBuilder {
    /// Declares a field that is always present.
    pub fn required(mut self, name: &'static str, ty: FieldType) -> Self {
        self.fields.push(Field {
            name,
            ty,
            nullable: false,
        });
        self
    }

    /// Declares a field that may be absent.
    pub fn nullable(mut self, name: &'static str, ty: FieldType) -> Self {
        self.fields.push(Field {
            name,
            ty,
            nullable: true,
        });
        self
    }

    /// Overrides the computed size bound. Decoding rejects records whose
    /// consumed size exceeds it and encoding refuses to produce them.
    pub fn max_encoded_size(mut self, max: usize) -> Self {
        self.max_encoded_size = Some(max);
        self
    }

    pub fn build(self) -> Result<RecordSchema, SchemaError> {
        let schema_name = self.name;
        let mut names = HashSet::new();
        for field in &self.fields {
            if !names.insert(field.name) {
                return Err(SchemaError::DuplicateField {
                    schema: schema_name.to_string(),
                    field: field.name.to_string(),
                });
            }
            check_field_type(schema_name, field.name, &field.ty)?;
        }

        let nullable_count = self.fields.iter().filter(|f| f.nullable).count();
        let nullable_bitfield_bytes = nullable_count.div_ceil(8);
        let fixed_total: usize = self.fields.iter().filter_map(|f| f.ty.fixed_size()).sum();
        let variable_field_count = self
            .fields
            .iter()
            .filter(|f| f.ty.fixed_size().is_none())
            .count();

        // Fixed-width fields first, in declaration order, then the offset
        // table in declaration order of the variable fields.
        let mut cursor = nullable_bitfield_bytes;
        let mut layouts = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            match field.ty.fixed_size() {
                Some(size) => {
                    layouts.push(Some(FieldLayout::Embedded {
                        offset: cursor,
                        size,
                    }));
                    cursor += size;
                }
                None => layouts.push(None),
            }
        }
        for layout in layouts.iter_mut().filter(|l| l.is_none()) {
            *layout = Some(FieldLayout::Indirect { slot: cursor });
            cursor += 4;
        }
        let fixed_block_size = cursor;

        let expected = nullable_bitfield_bytes + fixed_total + 4 * variable_field_count;
        if fixed_block_size != expected {
            return Err(SchemaError::LayoutMismatch {
                schema: schema_name.to_string(),
                actual: fixed_block_size,
                expected,
            });
        }

        let mut next_bit = 0;
        let fields: Vec<FieldSpec> = self
            .fields
            .into_iter()
            .zip(layouts)
            .map(|(field, layout)| {
                let presence_bit = field.nullable.then(|| {
                    next_bit += 1;
                    next_bit - 1
                });
                FieldSpec {
                    field,
                    layout: layout.unwrap_or(FieldLayout::Indirect { slot: 0 }),
                    presence_bit,
                }
            })
            .collect();

        let computed_max = fields
            .iter()
            .filter(|f| matches!(f.layout, FieldLayout::Indirect { .. }))
            .fold(fixed_block_size, |acc, f| acc.saturating_add(f.ty().max_size()))
            .min(MAX_WIRE_LENGTH);
        let max_encoded_size = self.max_encoded_size.unwrap_or(computed_max);
        if max_encoded_size < fixed_block_size {
            return Err(SchemaError::MaxSizeBelowFixedBlock {
                schema: schema_name.to_string(),
                max: max_encoded_size,
                fixed: fixed_block_size,
            });
        }

        Ok(RecordSchema {
            name: schema_name,
            fields,
            nullable_bitfield_bytes,
            fixed_block_size,
            variable_field_count,
            max_encoded_size,
        })
    }
}

fn check_field_type(schema: &'static str, field: &'static str, ty: &FieldType) -> Result<(), SchemaError> {
    match ty {
        FieldType::Struct(inner) if !inner.is_fixed_size() => Err(SchemaError::StructNotFixed {
            schema: schema.to_string(),
            field: field.to_string(),
            inner: inner.name().to_string(),
        }),
        FieldType::Record(inner) if inner.fixed_block_size() == 0 => Err(SchemaError::EmptyRecord {
            schema: schema.to_string(),
            field: field.to_string(),
            inner: inner.name().to_string(),
        }),
        FieldType::Array { element, .. } => check_field_type(schema, field, element),
        FieldType::Map { key, value, .. } => {
            if !key.is_valid_map_key() {
                return Err(SchemaError::UnsupportedMapKey {
                    schema: schema.to_string(),
                    field: field.to_string(),
                    key: key.name(),
                });
            }
            check_field_type(schema, field, value)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_TYPE: EnumDef = EnumDef::new("ClientType", &["Game", "Editor"]);

    fn host_address() -> Arc<RecordSchema> {
        Arc::new(
            RecordSchema::builder("HostAddress")
                .required("port", FieldType::I16)
                .required("host", FieldType::string(256))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_layout_of_mixed_record() {
        let schema = RecordSchema::builder("Connect")
            .required("protocol_hash", FieldType::FixedAscii(64))
            .required("client_type", FieldType::Enum(CLIENT_TYPE))
            .nullable("language", FieldType::ascii(128))
            .nullable("identity_token", FieldType::string(8192))
            .required("uuid", FieldType::Uuid)
            .required("username", FieldType::ascii(16))
            .nullable("referral_data", FieldType::array(FieldType::U8, 4096))
            .nullable("referral_source", FieldType::Record(host_address()))
            .build()
            .unwrap();

        assert_eq!(schema.nullable_bitfield_bytes(), 1);
        assert_eq!(schema.variable_field_count(), 5);
        // 1 + 64 + 1 + 16 embedded, then five slots.
        assert_eq!(schema.fixed_block_size(), 102);
        assert_eq!(schema.variable_block_start(), 102);

        let layout = |name| schema.field(name).unwrap().layout();
        assert_eq!(layout("protocol_hash"), FieldLayout::Embedded { offset: 1, size: 64 });
        assert_eq!(layout("client_type"), FieldLayout::Embedded { offset: 65, size: 1 });
        assert_eq!(layout("uuid"), FieldLayout::Embedded { offset: 66, size: 16 });
        assert_eq!(layout("language"), FieldLayout::Indirect { slot: 82 });
        assert_eq!(layout("identity_token"), FieldLayout::Indirect { slot: 86 });
        assert_eq!(layout("username"), FieldLayout::Indirect { slot: 90 });
        assert_eq!(layout("referral_data"), FieldLayout::Indirect { slot: 94 });
        assert_eq!(layout("referral_source"), FieldLayout::Indirect { slot: 98 });

        let bit = |name| schema.field(name).unwrap().presence_bit();
        assert_eq!(bit("language"), Some(0));
        assert_eq!(bit("identity_token"), Some(1));
        assert_eq!(bit("username"), None);
        assert_eq!(bit("referral_data"), Some(2));
        assert_eq!(bit("referral_source"), Some(3));
    }

    #[test]
    fn test_field_kinds() {
        let instant = Arc::new(
            RecordSchema::builder("InstantData")
                .required("seconds", FieldType::I64)
                .required("nanos", FieldType::I32)
                .build()
                .unwrap(),
        );
        let schema = RecordSchema::builder("Mixed")
            .required("count", FieldType::I32)
            .required("at", FieldType::Struct(instant.clone()))
            .nullable("maybe", FieldType::Struct(instant))
            .nullable("name", FieldType::string(8))
            .build()
            .unwrap();
        let kind = |name| schema.field(name).unwrap().kind();
        assert_eq!(kind("count"), FieldKind::FixedScalar);
        assert_eq!(kind("at"), FieldKind::FixedStruct);
        assert_eq!(kind("maybe"), FieldKind::NullableFixed);
        assert_eq!(kind("name"), FieldKind::Variable);
        assert_eq!(schema.fixed_block_size(), 1 + 4 + 12 + 12 + 4);
    }

    #[test]
    fn test_bitmask_spills_into_second_byte() {
        let mut builder = RecordSchema::builder("Wide");
        for name in ["a", "b", "c", "d", "e", "f", "g", "h", "i"] {
            builder = builder.nullable(name, FieldType::U8);
        }
        let schema = builder.build().unwrap();
        assert_eq!(schema.nullable_bitfield_bytes(), 2);
        assert_eq!(schema.field("i").unwrap().presence_bit(), Some(8));
        assert_eq!(schema.fixed_block_size(), 2 + 9);
    }

    #[test]
    fn test_no_nullable_fields_means_no_bitmask() {
        let schema = RecordSchema::builder("Vector3f")
            .required("x", FieldType::F32)
            .required("y", FieldType::F32)
            .required("z", FieldType::F32)
            .build()
            .unwrap();
        assert_eq!(schema.nullable_bitfield_bytes(), 0);
        assert_eq!(schema.fixed_block_size(), 12);
        assert_eq!(schema.max_encoded_size(), 12);
        assert!(schema.is_fixed_size());
    }

    #[test]
    fn test_computed_max_size() {
        let schema = RecordSchema::builder("Chat")
            .nullable("message", FieldType::string(300))
            .build()
            .unwrap();
        // bitmask + slot + varint(300) + 300
        assert_eq!(schema.max_encoded_size(), 1 + 4 + 2 + 300);
    }

    #[test]
    fn test_rejects_duplicate_field() {
        let err = RecordSchema::builder("Dup")
            .required("a", FieldType::U8)
            .nullable("a", FieldType::U8)
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { .. }));
    }

    #[test]
    fn test_rejects_variable_struct() {
        let err = RecordSchema::builder("Outer")
            .required("host", FieldType::Struct(host_address()))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::StructNotFixed { .. }));
    }

    #[test]
    fn test_rejects_empty_variable_record() {
        let empty = Arc::new(RecordSchema::builder("Empty").build().unwrap());
        let err = RecordSchema::builder("Outer")
            .nullable("e", FieldType::Record(empty.clone()))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::EmptyRecord { ref inner, .. } if inner == "Empty"));

        let err = RecordSchema::builder("Outer")
            .required("list", FieldType::array(FieldType::Record(empty.clone()), 4))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::EmptyRecord { .. }));

        // Embedded, it occupies no bytes and needs no offset.
        assert!(
            RecordSchema::builder("Outer")
                .required("e", FieldType::Struct(empty))
                .build()
                .is_ok()
        );
    }

    #[test]
    fn test_rejects_float_map_key() {
        let err = RecordSchema::builder("Weights")
            .nullable("by_weight", FieldType::map(FieldType::F32, FieldType::I32, 8))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedMapKey { key: "f32", .. }));
    }

    #[test]
    fn test_rejects_max_below_fixed_block() {
        let err = RecordSchema::builder("Tiny")
            .required("a", FieldType::I64)
            .max_encoded_size(4)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MaxSizeBelowFixedBlock { max: 4, fixed: 8, .. }
        ));
    }

    #[test]
    fn test_enum_lookup() {
        assert_eq!(CLIENT_TYPE.variant(1), Some("Editor"));
        assert_eq!(CLIENT_TYPE.variant(2), None);
        assert_eq!(CLIENT_TYPE.discriminant("Game"), Some(0));
    }
}
