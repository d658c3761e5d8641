//! Built-in message schemas.
//!
//! Concrete messages are data, not code: each one is a [`RecordSchema`]
//! built once on first use and shared behind an [`Arc`]. The record codec
//! derives every layout detail (bitmask size, field offsets, slot
//! positions, maximum size) from these declarations.
//!
//! [`PacketRegistry::builtin`] registers the packets under their wire ids.
//!
//! # Example
//!
//! ```
//! use tessera_codec::{Record, Value};
//! use tessera_protocol::messages::{self, PING};
//!
//! let ping = Record::new(&PING)
//!     .with("id", 4)
//!     .with("last_ping_value_raw", 0)
//!     .with("last_ping_value_direct", 0)
//!     .with("last_ping_value_tick", 0);
//! let pong = messages::pong_reply(&ping);
//! assert_eq!(pong.get("id"), Some(&Value::I32(4)));
//! ```

use std::sync::{Arc, LazyLock};

use tessera_codec::{EnumDef, FieldType, Record, RecordSchema, SchemaError, Value};

use crate::{PacketId, PacketInfo, PacketRegistry, ProtocolError};

// ---------------------------------------------------------------------------
// Packet ids
// ---------------------------------------------------------------------------

impl PacketId {
    pub const CONNECT: Self = Self(0);
    pub const DISCONNECT: Self = Self(1);
    pub const PING: Self = Self(2);
    pub const PONG: Self = Self(3);
    pub const SERVER_AUTH_TOKEN: Self = Self(13);
    pub const UPDATE_EQUALIZER_EFFECTS: Self = Self(82);
    pub const SET_GAME_MODE: Self = Self(101);
    pub const UPDATE_TIME: Self = Self(146);
    pub const CHAT_MESSAGE: Self = Self(211);
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

pub const CLIENT_TYPE: EnumDef = EnumDef::new("ClientType", &["Game", "Editor"]);
pub const DISCONNECT_TYPE: EnumDef = EnumDef::new("DisconnectType", &["Disconnect", "Crash"]);
pub const PONG_TYPE: EnumDef = EnumDef::new("PongType", &["Raw", "Direct", "Tick"]);
pub const GAME_MODE: EnumDef = EnumDef::new("GameMode", &["Adventure", "Creative"]);
pub const UPDATE_TYPE: EnumDef = EnumDef::new("UpdateType", &["Init", "AddOrUpdate", "Remove"]);

// ---------------------------------------------------------------------------
// Shared structures
// ---------------------------------------------------------------------------

/// Longest chat line or disconnect reason, in bytes.
const MAX_TEXT: usize = 4_096_000;

fn schema(build: fn() -> Result<RecordSchema, SchemaError>) -> Arc<RecordSchema> {
    // Built-in declarations are fixed at compile time and covered by tests.
    Arc::new(build().expect("built-in schema is well formed"))
}

pub static HOST_ADDRESS: LazyLock<Arc<RecordSchema>> = LazyLock::new(|| {
    schema(|| {
        RecordSchema::builder("HostAddress")
            .required("port", FieldType::I16)
            .required("host", FieldType::string(256))
            .build()
    })
});

/// A point in time: whole seconds plus nanoseconds.
pub static INSTANT_DATA: LazyLock<Arc<RecordSchema>> = LazyLock::new(|| {
    schema(|| {
        RecordSchema::builder("InstantData")
            .required("seconds", FieldType::I64)
            .required("nanos", FieldType::I32)
            .build()
    })
});

pub static EQUALIZER_EFFECT: LazyLock<Arc<RecordSchema>> = LazyLock::new(|| {
    schema(|| {
        RecordSchema::builder("EqualizerEffect")
            .nullable("id", FieldType::string(MAX_TEXT))
            .required("low_gain", FieldType::F32)
            .required("low_cut_off", FieldType::F32)
            .required("low_mid_gain", FieldType::F32)
            .required("low_mid_center", FieldType::F32)
            .required("low_mid_width", FieldType::F32)
            .required("high_mid_gain", FieldType::F32)
            .required("high_mid_center", FieldType::F32)
            .required("high_mid_width", FieldType::F32)
            .required("high_gain", FieldType::F32)
            .required("high_cut_off", FieldType::F32)
            .build()
    })
});

// ---------------------------------------------------------------------------
// Packets
// ---------------------------------------------------------------------------

pub static CONNECT: LazyLock<Arc<RecordSchema>> = LazyLock::new(|| {
    schema(|| {
        RecordSchema::builder("Connect")
            .required("protocol_hash", FieldType::FixedAscii(64))
            .required("client_type", FieldType::Enum(CLIENT_TYPE))
            .nullable("language", FieldType::ascii(128))
            .nullable("identity_token", FieldType::string(8192))
            .required("uuid", FieldType::Uuid)
            .required("username", FieldType::ascii(16))
            .nullable("referral_data", FieldType::array(FieldType::U8, 4096))
            .nullable("referral_source", FieldType::Record(HOST_ADDRESS.clone()))
            .build()
    })
});

pub static DISCONNECT: LazyLock<Arc<RecordSchema>> = LazyLock::new(|| {
    schema(|| {
        RecordSchema::builder("Disconnect")
            .nullable("reason", FieldType::string(MAX_TEXT))
            .required("type", FieldType::Enum(DISCONNECT_TYPE))
            .build()
    })
});

pub static PING: LazyLock<Arc<RecordSchema>> = LazyLock::new(|| {
    schema(|| {
        RecordSchema::builder("Ping")
            .required("id", FieldType::I32)
            .nullable("time", FieldType::Struct(INSTANT_DATA.clone()))
            .required("last_ping_value_raw", FieldType::I32)
            .required("last_ping_value_direct", FieldType::I32)
            .required("last_ping_value_tick", FieldType::I32)
            .build()
    })
});

pub static PONG: LazyLock<Arc<RecordSchema>> = LazyLock::new(|| {
    schema(|| {
        RecordSchema::builder("Pong")
            .required("id", FieldType::I32)
            .nullable("time", FieldType::Struct(INSTANT_DATA.clone()))
            .required("type", FieldType::Enum(PONG_TYPE))
            .required("packet_queue_size", FieldType::I16)
            .build()
    })
});

pub static SERVER_AUTH_TOKEN: LazyLock<Arc<RecordSchema>> = LazyLock::new(|| {
    schema(|| {
        RecordSchema::builder("ServerAuthToken")
            .nullable("server_access_token", FieldType::string(8192))
            .nullable("password_challenge", FieldType::array(FieldType::U8, 64))
            .build()
    })
});

pub static CHAT_MESSAGE: LazyLock<Arc<RecordSchema>> = LazyLock::new(|| {
    schema(|| {
        RecordSchema::builder("ChatMessage")
            .nullable("message", FieldType::string(MAX_TEXT))
            .build()
    })
});

pub static SET_GAME_MODE: LazyLock<Arc<RecordSchema>> = LazyLock::new(|| {
    schema(|| {
        RecordSchema::builder("SetGameMode")
            .required("game_mode", FieldType::Enum(GAME_MODE))
            .build()
    })
});

pub static UPDATE_TIME: LazyLock<Arc<RecordSchema>> = LazyLock::new(|| {
    schema(|| {
        RecordSchema::builder("UpdateTime")
            .nullable("game_time", FieldType::Struct(INSTANT_DATA.clone()))
            .build()
    })
});

pub static UPDATE_EQUALIZER_EFFECTS: LazyLock<Arc<RecordSchema>> = LazyLock::new(|| {
    schema(|| {
        RecordSchema::builder("UpdateEqualizerEffects")
            .required("type", FieldType::Enum(UPDATE_TYPE))
            .required("max_id", FieldType::I32)
            .nullable(
                "effects",
                FieldType::map(
                    FieldType::I32,
                    FieldType::Record(EQUALIZER_EFFECT.clone()),
                    4_096_000,
                ),
            )
            .build()
    })
});

/// Packet ids paired with their schemas.
fn builtin_packets() -> [(PacketId, &'static LazyLock<Arc<RecordSchema>>); 9] {
    [
        (PacketId::CONNECT, &CONNECT),
        (PacketId::DISCONNECT, &DISCONNECT),
        (PacketId::PING, &PING),
        (PacketId::PONG, &PONG),
        (PacketId::SERVER_AUTH_TOKEN, &SERVER_AUTH_TOKEN),
        (PacketId::UPDATE_EQUALIZER_EFFECTS, &UPDATE_EQUALIZER_EFFECTS),
        (PacketId::SET_GAME_MODE, &SET_GAME_MODE),
        (PacketId::UPDATE_TIME, &UPDATE_TIME),
        (PacketId::CHAT_MESSAGE, &CHAT_MESSAGE),
    ]
}

impl PacketRegistry {
    /// A registry holding every built-in packet.
    pub fn builtin() -> Self {
        Self::try_builtin().expect("built-in packet ids and names are unique")
    }

    fn try_builtin() -> Result<Self, ProtocolError> {
        let mut registry = Self::new();
        for (id, schema) in builtin_packets() {
            registry.register(PacketInfo::new(id.0, Arc::clone(schema)))?;
        }
        Ok(registry)
    }
}

/// The `Pong` answering a `Ping`: same id and timestamp, type `Raw`.
pub fn pong_reply(ping: &Record) -> Record {
    let mut pong = Record::new(&PONG)
        .with("type", Value::Enum(0))
        .with("packet_queue_size", 0i16);
    if let Some(id) = ping.get("id") {
        pong.set("id", id.clone());
    }
    if let Some(time) = ping.get("time") {
        pong.set("time", time.clone());
    }
    pong
}
