//! Error types for the codec layer.
//!
//! Decoding and validation share one error type, [`DecodeError`], because
//! the validator walks exactly the same structure the decoder does: when
//! one of them rejects a buffer the other must reject it for the same
//! reason. Encoding has its own type, [`EncodeError`], since its failures
//! come from the caller's value rather than from the wire.
//!
//! Both carry a dotted field path (`Connect.referral_source.host`) so that
//! a rejected packet can be logged with enough context to find the bad byte.

/// What went wrong while reading a record from untrusted bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeErrorKind {
    /// A varint ran past 5 bytes, past the readable extent, or decoded to a
    /// value outside the wire's signed 32-bit length domain.
    #[error("malformed length prefix at byte {at}")]
    MalformedLength { at: usize },

    /// A string, array, or map declared more elements than its field allows.
    #[error("length {len} exceeds maximum {max}")]
    ValueTooLarge { len: usize, max: usize },

    /// An offset-table slot is negative (other than the `-1` sentinel), or
    /// disagrees with the nullable bitmask.
    #[error("invalid offset {offset}")]
    InvalidOffset { offset: i32 },

    /// An offset-table slot points at or past the readable extent.
    #[error("offset resolves to byte {position}, readable extent is {readable}")]
    OffsetOutOfBounds { position: usize, readable: usize },

    /// A field's span (prefix plus payload) runs past the readable extent.
    #[error("span ending at byte {end} overruns readable extent {readable}")]
    BufferOverflow { end: usize, readable: usize },

    /// Fewer bytes remain than the record's fixed block needs.
    #[error("fixed block needs {needed} bytes, {available} readable")]
    TruncatedHeader { needed: usize, available: usize },

    /// A map payload repeats a key.
    #[error("duplicate map key {key}")]
    DuplicateKey { key: String },

    /// An enumerated byte has no matching variant.
    #[error("{value} is not a valid {name} discriminant")]
    InvalidDiscriminant { name: &'static str, value: u8 },

    /// String bytes are not valid in the field's charset.
    #[error("payload is not valid {charset}")]
    InvalidText { charset: &'static str },

    /// Records nest deeper than the codec is willing to recurse.
    #[error("nesting exceeds {max} levels")]
    NestingTooDeep { max: usize },
}

/// A decode or validation failure, tagged with the offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {kind}")]
pub struct DecodeError {
    field: String,
    kind: DecodeErrorKind,
}

/// Validation reports the same failures as decoding.
pub type ValidationError = DecodeError;

impl DecodeError {
    /// Creates an error that is not yet attributed to a field.
    pub fn new(kind: DecodeErrorKind) -> Self {
        Self {
            field: String::new(),
            kind,
        }
    }

    /// The failure classification.
    pub fn kind(&self) -> &DecodeErrorKind {
        &self.kind
    }

    /// Dotted path to the field that failed, outermost first.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Prefixes the path with an enclosing field or record name.
    pub(crate) fn within(mut self, name: &str) -> Self {
        self.field = prefix_path(name, &self.field);
        self
    }
}

impl From<DecodeErrorKind> for DecodeError {
    fn from(kind: DecodeErrorKind) -> Self {
        Self::new(kind)
    }
}

/// What went wrong while writing a record.
///
/// These are caller errors: the value handed to the encoder does not fit
/// the schema it is being written with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeErrorKind {
    /// A required field holds `None`.
    #[error("required field is missing")]
    MissingField,

    /// The value's variant does not match the field's declared type.
    #[error("expected a {expected} value")]
    TypeMismatch { expected: &'static str },

    /// The record's field list does not line up with the schema.
    #[error("record built for {found} cannot be written as {expected}")]
    SchemaMismatch { expected: String, found: String },

    /// A variable-length value exceeds its field's declared maximum.
    #[error("length {len} exceeds maximum {max}")]
    ValueTooLarge { len: usize, max: usize },

    /// A map value holds the same key twice.
    #[error("duplicate map key {key}")]
    DuplicateKey { key: String },

    /// An enum value is outside the declared variants.
    #[error("{value} is not a valid {name} discriminant")]
    InvalidDiscriminant { name: &'static str, value: u8 },

    /// An ASCII field holds a non-ASCII character.
    #[error("value contains non-ASCII characters")]
    NonAscii,

    /// A fixed ASCII field holds a NUL, which would end the text early
    /// on decode.
    #[error("fixed-width text contains a NUL character")]
    EmbeddedNul,

    /// A fixed byte field was given a different number of bytes.
    #[error("length {len} does not match fixed width {expected}")]
    LengthMismatch { len: usize, expected: usize },

    /// A float cannot be written at the field's precision without
    /// changing its value.
    #[error("value is not exactly representable as {ty}")]
    NotRepresentable { ty: &'static str },

    /// A length does not fit the wire's signed 32-bit domain.
    #[error("length {len} cannot be represented on the wire")]
    LengthOverflow { len: usize },
}

/// An encode failure, tagged with the offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {kind}")]
pub struct EncodeError {
    field: String,
    kind: EncodeErrorKind,
}

impl EncodeError {
    /// Creates an error that is not yet attributed to a field.
    pub fn new(kind: EncodeErrorKind) -> Self {
        Self {
            field: String::new(),
            kind,
        }
    }

    /// The failure classification.
    pub fn kind(&self) -> &EncodeErrorKind {
        &self.kind
    }

    /// Dotted path to the field that failed, outermost first.
    pub fn field(&self) -> &str {
        &self.field
    }

    pub(crate) fn within(mut self, name: &str) -> Self {
        self.field = prefix_path(name, &self.field);
        self
    }
}

impl From<EncodeErrorKind> for EncodeError {
    fn from(kind: EncodeErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Problems found while building a [`RecordSchema`](crate::RecordSchema).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Two fields share a name.
    #[error("{schema}: duplicate field {field}")]
    DuplicateField { schema: String, field: String },

    /// A fixed-size struct member was given a schema with variable fields,
    /// so its size is not static.
    #[error("{schema}.{field}: embedded struct {inner} is not fixed-size")]
    StructNotFixed {
        schema: String,
        field: String,
        inner: String,
    },

    /// A variable record field was given a schema with no fields. Its
    /// payload would be empty, leaving its offset nothing to point at.
    #[error("{schema}.{field}: variable record {inner} has no fields")]
    EmptyRecord {
        schema: String,
        field: String,
        inner: String,
    },

    /// Map keys must be scalars or strings so equality is byte equality.
    #[error("{schema}.{field}: unsupported map key type {key}")]
    UnsupportedMapKey {
        schema: String,
        field: String,
        key: &'static str,
    },

    /// The declared maximum cannot even hold the fixed block.
    #[error("{schema}: max size {max} is smaller than fixed block {fixed}")]
    MaxSizeBelowFixedBlock {
        schema: String,
        max: usize,
        fixed: usize,
    },

    /// The computed layout broke the fixed-block size invariant.
    #[error("{schema}: fixed block is {actual} bytes, layout accounts for {expected}")]
    LayoutMismatch {
        schema: String,
        actual: usize,
        expected: usize,
    },
}

fn prefix_path(name: &str, rest: &str) -> String {
    if rest.is_empty() {
        name.to_string()
    } else if rest.starts_with('[') {
        format!("{name}{rest}")
    } else {
        format!("{name}.{rest}")
    }
}
