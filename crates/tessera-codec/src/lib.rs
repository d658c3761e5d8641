//! Binary record codec for Tessera.
//!
//! Every message on the wire is a *record*: a statically sized fixed block
//! followed by a variable block. This crate turns a declarative
//! [`RecordSchema`] into the three operations a receiver needs and the two
//! a sender needs:
//!
//! - **Read side** ([`RecordSchema::validate`], [`RecordSchema::decode`],
//!   [`RecordSchema::consumed_bytes`]): all driven by one traversal, so
//!   the validator and the decoder can never disagree about where a field
//!   ends.
//! - **Write side** ([`RecordSchema::encode`],
//!   [`RecordSchema::encoded_size`]): slot reservation and backfill via
//!   [`ByteWriter`].
//! - **Primitives** ([`ByteReader`], [`ByteWriter`], varints,
//!   [`RelativeOffset`]): bounds-checked byte access.
//!
//! # Record layout
//!
//! ```text
//! [nullable bits][fixed fields][offset slots] [variable payloads...]
//! └──────────── fixed block ───────────────┘ └─ variable block ───┘
//! ```
//!
//! # Example
//!
//! ```
//! use tessera_codec::{FieldType, Record, RecordSchema};
//!
//! let schema = RecordSchema::builder("Sample")
//!     .nullable("id", FieldType::string(16))
//!     .required("count", FieldType::I32)
//!     .build()?;
//!
//! let record = Record::new(&schema).with("count", 7);
//! let bytes = schema.encode_to_vec(&record)?;
//! assert_eq!(bytes, [0x00, 7, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);
//!
//! schema.validate(&bytes, 0)?;
//! assert_eq!(schema.decode(&bytes, 0)?, record);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Feature Flags
//!
//! - `serde` (default): `Serialize` for [`Value`] and [`Record`], with
//!   UUIDs in their hyphenated form

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod buffer;
mod encode;
mod error;
mod offset;
mod schema;
mod value;
mod varint;
mod walk;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use buffer::{ByteReader, ByteWriter, DeferredSlot, f16_to_f32, f32_to_f16};
pub use error::{DecodeError, DecodeErrorKind, EncodeError, EncodeErrorKind, SchemaError, ValidationError};
pub use offset::{RelativeOffset, VariableBlock};
pub use schema::{
    Charset, EnumDef, Field, FieldKind, FieldLayout, FieldSpec, FieldType, RecordSchema,
    RecordSchemaBuilder,
};
pub use value::{Record, Value};
pub use varint::{MAX_VARINT_LEN, MAX_WIRE_LENGTH, peek_varint, varint_len, varint_size, write_varint};
pub use walk::MAX_NESTING_DEPTH;

pub use uuid::Uuid;
