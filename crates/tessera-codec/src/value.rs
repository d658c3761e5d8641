//! Decoded values.
//!
//! [`Value`] is the in-memory form of any field; [`Record`] is an ordered
//! set of named, possibly absent fields matching one [`RecordSchema`].

use std::fmt;

#[cfg(feature = "serde")]
use serde::ser::{Serialize, SerializeMap, Serializer};
use uuid::Uuid;

use crate::schema::RecordSchema;

/// A single decoded field value.
///
/// `F16` fields decode to [`Value::F32`]. Both `FixedAscii` and `String`
/// fields decode to [`Value::Text`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Enum discriminant.
    Enum(u8),
    Uuid(Uuid),
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// Entries in wire order.
    Map(Vec<(Value, Value)>),
    Record(Record),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Any integer variant, widened.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::I8(v) => Some(v.into()),
            Self::U8(v) => Some(v.into()),
            Self::I16(v) => Some(v.into()),
            Self::U16(v) => Some(v.into()),
            Self::I32(v) => Some(v.into()),
            Self::U32(v) => Some(v.into()),
            Self::I64(v) => Some(v),
            Self::U64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::F32(v) => Some(v.into()),
            Self::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::I8(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::Enum(v) => write!(f, "#{v}"),
            Self::Uuid(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Array(items) => write!(f, "[{} items]", items.len()),
            Self::Map(entries) => write!(f, "{{{} entries}}", entries.len()),
            Self::Record(r) => write!(f, "{r}"),
        }
    }
}

#[cfg(feature = "serde")]
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::I8(v) => serializer.serialize_i8(*v),
            Self::U8(v) => serializer.serialize_u8(*v),
            Self::I16(v) => serializer.serialize_i16(*v),
            Self::U16(v) => serializer.serialize_u16(*v),
            Self::I32(v) => serializer.serialize_i32(*v),
            Self::U32(v) => serializer.serialize_u32(*v),
            Self::I64(v) => serializer.serialize_i64(*v),
            Self::U64(v) => serializer.serialize_u64(*v),
            Self::F32(v) => serializer.serialize_f32(*v),
            Self::F64(v) => serializer.serialize_f64(*v),
            Self::Enum(v) => serializer.serialize_u8(*v),
            Self::Uuid(v) => v.serialize(serializer),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Bytes(b) => serializer.collect_seq(b),
            Self::Array(items) => serializer.collect_seq(items),
            Self::Map(entries) => serializer.collect_seq(entries),
            Self::Record(r) => r.serialize(serializer),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Self::$variant(v)
            }
        })*
    };
}

impl_from! {
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Uuid => Uuid,
    String => Text,
    Vec<Value> => Array,
    Vec<(Value, Value)> => Map,
    Record => Record,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Field values of one record, in schema declaration order.
///
/// `None` marks an absent nullable field. A record is created from its
/// schema so it always carries exactly the schema's field names.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: &'static str,
    fields: Vec<(&'static str, Option<Value>)>,
}

impl Record {
    /// A record with every field absent.
    pub fn new(schema: &RecordSchema) -> Self {
        Self {
            schema: schema.name(),
            fields: schema.fields().iter().map(|f| (f.name(), None)).collect(),
        }
    }

    pub(crate) fn from_parts(schema: &RecordSchema, values: Vec<Option<Value>>) -> Self {
        Self {
            schema: schema.name(),
            fields: schema
                .fields()
                .iter()
                .map(|f| f.name())
                .zip(values)
                .collect(),
        }
    }

    /// Name of the schema this record was created from.
    pub fn schema_name(&self) -> &'static str {
        self.schema
    }

    /// Sets a field. Returns `false` if the schema has no such field.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> bool {
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => {
                *slot = Some(value.into());
                true
            }
            None => false,
        }
    }

    /// Builder form of [`set`](Self::set). Unknown names are ignored.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Marks a field absent and returns its previous value.
    pub fn clear(&mut self, name: &str) -> Option<Value> {
        self.fields
            .iter_mut()
            .find(|(n, _)| *n == name)
            .and_then(|(_, slot)| slot.take())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, v)| v.as_ref())
    }

    /// All fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, Option<&Value>)> {
        self.fields.iter().map(|(n, v)| (*n, v.as_ref()))
    }

    pub(crate) fn values(&self) -> &[(&'static str, Option<Value>)] {
        &self.fields
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{ ", self.schema)?;
        let mut first = true;
        for (name, value) in self.fields() {
            if let Some(value) = value {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{name}: {value}")?;
                first = false;
            }
        }
        write!(f, " }}")
    }
}

#[cfg(feature = "serde")]
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
