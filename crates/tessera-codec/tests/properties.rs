//! Property tests for the record codec.
//!
//! The read side faces untrusted bytes, so the properties here are about
//! agreement: whatever the validator accepts, the decoder and the size
//! measurement must accept too, and no strict prefix of a valid record is
//! itself valid.

use std::sync::{Arc, LazyLock};

use proptest::prelude::*;
use tessera_codec::{EnumDef, FieldType, Record, RecordSchema, Uuid, Value, f16_to_f32};

const MODE: EnumDef = EnumDef::new("Mode", &["Adventure", "Creative", "Spectator"]);

static HOST_ADDRESS: LazyLock<Arc<RecordSchema>> = LazyLock::new(|| {
    Arc::new(
        RecordSchema::builder("HostAddress")
            .required("port", FieldType::I16)
            .required("host", FieldType::string(64))
            .build()
            .unwrap(),
    )
});

static POSITION: LazyLock<Arc<RecordSchema>> = LazyLock::new(|| {
    Arc::new(
        RecordSchema::builder("Position")
            .required("x", FieldType::I32)
            .required("y", FieldType::I32)
            .nullable("layer", FieldType::U8)
            .build()
            .unwrap(),
    )
});

static PROFILE: LazyLock<Arc<RecordSchema>> = LazyLock::new(|| {
    Arc::new(
        RecordSchema::builder("Profile")
            .nullable("id", FieldType::string(32))
            .required("count", FieldType::I32)
            .nullable("tags", FieldType::array(FieldType::string(8), 4))
            .nullable("scores", FieldType::map(FieldType::I32, FieldType::U8, 3))
            .nullable("origin", FieldType::Record(HOST_ADDRESS.clone()))
            .nullable("flag", FieldType::Bool)
            .required("uuid", FieldType::Uuid)
            .nullable("gain", FieldType::F16)
            .required("hash", FieldType::FixedAscii(8))
            .nullable("digest", FieldType::FixedBytes(4))
            .required("mode", FieldType::Enum(MODE))
            .nullable("position", FieldType::Struct(POSITION.clone()))
            .nullable("by_name", FieldType::map(FieldType::ascii(8), FieldType::I64, 3))
            .build()
            .unwrap(),
    )
});

fn arb_origin() -> impl Strategy<Value = Record> {
    (any::<i16>(), "[a-z.]{1,64}").prop_map(|(port, host)| {
        Record::new(&HOST_ADDRESS)
            .with("port", port)
            .with("host", host)
    })
}

fn arb_position() -> impl Strategy<Value = Record> {
    (any::<i32>(), any::<i32>(), proptest::option::of(any::<u8>())).prop_map(|(x, y, layer)| {
        let mut record = Record::new(&POSITION).with("x", x).with("y", y);
        if let Some(layer) = layer {
            record.set("layer", layer);
        }
        record
    })
}

/// Every finite or infinite binary16 value, widened.
fn arb_half() -> impl Strategy<Value = f32> {
    any::<u16>().prop_map(f16_to_f32).prop_filter("NaN never compares equal", |v| !v.is_nan())
}

/// The fixed-width and embedded part of a profile, plus its
/// string-keyed map.
#[derive(Debug, Clone)]
struct Extras {
    gain: Option<f32>,
    hash: String,
    digest: Option<[u8; 4]>,
    mode: u8,
    position: Option<Record>,
    by_name: Option<Vec<(String, i64)>>,
}

fn arb_extras() -> impl Strategy<Value = Extras> {
    (
        proptest::option::of(arb_half()),
        "[a-f0-9]{0,8}",
        proptest::option::of(any::<[u8; 4]>()),
        0u8..3,
        proptest::option::of(arb_position()),
        proptest::option::of(proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..=3)),
    )
        .prop_map(|(gain, hash, digest, mode, position, by_name)| Extras {
            gain,
            hash,
            digest,
            mode,
            position,
            by_name: by_name.map(|m| m.into_iter().collect()),
        })
}

fn arb_profile() -> impl Strategy<Value = Record> {
    (
        proptest::option::of("[a-zA-Z0-9 ]{0,32}"),
        any::<i32>(),
        proptest::option::of(proptest::collection::vec("[a-z]{0,8}", 0..=4)),
        proptest::option::of(proptest::collection::btree_map(any::<i32>(), any::<u8>(), 0..=3)),
        proptest::option::of(arb_origin()),
        proptest::option::of(any::<bool>()),
        any::<u128>(),
        arb_extras(),
    )
        .prop_map(|(id, count, tags, scores, origin, flag, uuid, extras)| {
            let mut record = Record::new(&PROFILE)
                .with("count", count)
                .with("uuid", Uuid::from_u128(uuid))
                .with("hash", extras.hash)
                .with("mode", Value::Enum(extras.mode));
            if let Some(id) = id {
                record.set("id", id);
            }
            if let Some(tags) = tags {
                record.set("tags", tags.into_iter().map(Value::from).collect::<Vec<_>>());
            }
            if let Some(scores) = scores {
                let entries: Vec<(Value, Value)> = scores
                    .into_iter()
                    .map(|(k, v)| (Value::I32(k), Value::U8(v)))
                    .collect();
                record.set("scores", entries);
            }
            if let Some(origin) = origin {
                record.set("origin", origin);
            }
            if let Some(flag) = flag {
                record.set("flag", flag);
            }
            if let Some(gain) = extras.gain {
                record.set("gain", gain);
            }
            if let Some(digest) = extras.digest {
                record.set("digest", Value::Bytes(digest.to_vec()));
            }
            if let Some(position) = extras.position {
                record.set("position", position);
            }
            if let Some(by_name) = extras.by_name {
                let entries: Vec<(Value, Value)> = by_name
                    .into_iter()
                    .map(|(k, v)| (Value::Text(k), Value::I64(v)))
                    .collect();
                record.set("by_name", entries);
            }
            record
        })
}

proptest! {
    #[test]
    fn encoded_records_validate_and_decode(record in arb_profile()) {
        let bytes = PROFILE.encode_to_vec(&record).unwrap();
        prop_assert_eq!(PROFILE.encoded_size(&record).unwrap(), bytes.len());
        prop_assert!(PROFILE.validate(&bytes, 0).is_ok());
        prop_assert_eq!(PROFILE.consumed_bytes(&bytes, 0).unwrap(), bytes.len());
        prop_assert_eq!(PROFILE.decode(&bytes, 0).unwrap(), record);
    }

    #[test]
    fn every_strict_prefix_is_rejected(record in arb_profile()) {
        let bytes = PROFILE.encode_to_vec(&record).unwrap();
        for len in 0..bytes.len() {
            prop_assert!(
                PROFILE.validate(&bytes[..len], 0).is_err(),
                "prefix of {} bytes out of {} validated",
                len,
                bytes.len()
            );
        }
    }

    #[test]
    fn leading_bytes_do_not_change_the_result(
        record in arb_profile(),
        prefix in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let bytes = PROFILE.encode_to_vec(&record).unwrap();
        let mut shifted = prefix.clone();
        shifted.extend_from_slice(&bytes);
        prop_assert_eq!(PROFILE.decode(&shifted, prefix.len()).unwrap(), record);
    }

    #[test]
    fn validated_mutations_always_decode(
        record in arb_profile(),
        position in any::<prop::sample::Index>(),
        byte in any::<u8>(),
    ) {
        let mut bytes = PROFILE.encode_to_vec(&record).unwrap();
        let at = position.index(bytes.len());
        bytes[at] = byte;
        if PROFILE.validate(&bytes, 0).is_ok() {
            prop_assert!(PROFILE.decode(&bytes, 0).is_ok());
            prop_assert!(PROFILE.consumed_bytes(&bytes, 0).unwrap() <= bytes.len());
        }
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let validated = PROFILE.validate(&bytes, 0);
        let decoded = PROFILE.decode(&bytes, 0);
        prop_assert_eq!(validated.is_ok(), decoded.is_ok());
        if let Err(err) = validated {
            prop_assert_eq!(Some(&err), decoded.as_ref().err());
        }
    }
}
