//! Integration tests for the built-in packets.
//!
//! Layout sizes are pinned here because peers depend on them: a change to
//! a built-in declaration that moves a field is a wire break.

use std::sync::Arc;

use tessera_codec::{DecodeErrorKind, Record, Uuid, Value};
use tessera_protocol::messages::{self, CONNECT, EQUALIZER_EFFECT, HOST_ADDRESS, INSTANT_DATA, PING, UPDATE_EQUALIZER_EFFECTS, UPDATE_TIME};
use tessera_protocol::{ConnectionStats, Packet, PacketCodec, PacketId, PacketRegistry, ProtocolError};
use tessera_transport::RawFrame;

fn codec() -> PacketCodec<ConnectionStats> {
    PacketCodec::new(Arc::new(PacketRegistry::builtin())).with_stats(ConnectionStats::new())
}

fn instant(seconds: i64, nanos: i32) -> Record {
    Record::new(&INSTANT_DATA)
        .with("seconds", seconds)
        .with("nanos", nanos)
}

fn ping(id: i32) -> Record {
    Record::new(&PING)
        .with("id", id)
        .with("time", instant(1_700_000_000, 250))
        .with("last_ping_value_raw", 12)
        .with("last_ping_value_direct", 9)
        .with("last_ping_value_tick", 33)
}

// =========================================================================
// Layouts
// =========================================================================

#[test]
fn test_fixed_block_sizes() {
    let registry = PacketRegistry::builtin();
    let fixed = |name: &str| registry.by_name(name).unwrap().schema.fixed_block_size();

    assert_eq!(fixed("Ping"), 29);
    assert_eq!(fixed("Pong"), 20);
    assert_eq!(fixed("UpdateTime"), 13);
    assert_eq!(fixed("SetGameMode"), 1);
    assert_eq!(fixed("Connect"), 102);
    assert_eq!(fixed("Disconnect"), 6);
    assert_eq!(fixed("ChatMessage"), 5);
    assert_eq!(fixed("ServerAuthToken"), 9);
    assert_eq!(fixed("UpdateEqualizerEffects"), 10);
}

#[test]
fn test_fixed_size_packets_are_capped_at_their_layout() {
    let registry = PacketRegistry::builtin();
    for name in ["Ping", "Pong", "UpdateTime", "SetGameMode"] {
        let info = registry.by_name(name).unwrap();
        assert!(info.schema.is_fixed_size(), "{name}");
        assert_eq!(info.max_size, info.schema.fixed_block_size(), "{name}");
    }
}

#[test]
fn test_lookup_by_id_and_name_agree() {
    let registry = PacketRegistry::builtin();
    assert_eq!(registry.by_id(PacketId::CHAT_MESSAGE).unwrap().name, "ChatMessage");
    assert_eq!(registry.by_name("UpdateTime").unwrap().id, PacketId::UPDATE_TIME);
    assert!(registry.by_id(PacketId(10)).is_none());
}

// =========================================================================
// Packets through the codec
// =========================================================================

#[test]
fn test_ping_round_trip() {
    let mut codec = codec();
    let frame = codec.encode(&Packet::new(2, ping(7))).unwrap();
    assert_eq!(frame.payload.len(), 29);
    assert_eq!(frame.payload[0], 0x01);

    let packet = codec.decode(frame).unwrap();
    assert_eq!(packet.id, PacketId::PING);
    assert_eq!(packet.record, ping(7));
}

#[test]
fn test_update_time_without_time_keeps_placeholder() {
    let mut codec = codec();
    let frame = codec
        .encode(&Packet::new(146, Record::new(&UPDATE_TIME)))
        .unwrap();
    assert_eq!(frame.payload, [0u8; 13]);
    assert_eq!(codec.decode(frame).unwrap().record.get("game_time"), None);
}

#[test]
fn test_connect_round_trip() {
    let mut codec = codec();
    let source = Record::new(&HOST_ADDRESS)
        .with("port", 5520i16)
        .with("host", "lobby.example.net");
    let connect = Record::new(&CONNECT)
        .with("protocol_hash", "6708f121966c1c443f4b0eb525b2f81d")
        .with("client_type", Value::Enum(0))
        .with("language", "en-US")
        .with("uuid", Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef))
        .with("username", "steve")
        .with("referral_data", vec![Value::U8(1), Value::U8(2)])
        .with("referral_source", source);

    let frame = codec.encode(&Packet::new(0, connect.clone())).unwrap();
    assert_eq!(codec.decode(frame).unwrap().record, connect);
}

#[test]
fn test_equalizer_effects_round_trip() {
    let effect = |id: Option<&str>, gain: f32| {
        let mut record = Record::new(&EQUALIZER_EFFECT);
        if let Some(id) = id {
            record.set("id", id);
        }
        for field in [
            "low_gain",
            "low_cut_off",
            "low_mid_gain",
            "low_mid_center",
            "low_mid_width",
            "high_mid_gain",
            "high_mid_center",
            "high_mid_width",
            "high_gain",
            "high_cut_off",
        ] {
            record.set(field, gain);
        }
        record
    };
    let update = Record::new(&UPDATE_EQUALIZER_EFFECTS)
        .with("type", Value::Enum(1))
        .with("max_id", 2)
        .with(
            "effects",
            vec![
                (Value::I32(1), Value::Record(effect(Some("cave"), 0.5))),
                (Value::I32(2), Value::Record(effect(None, -3.0))),
            ],
        );

    let mut codec = codec();
    let frame = codec.encode(&Packet::new(82, update.clone())).unwrap();
    assert_eq!(codec.decode(frame).unwrap().record, update);
}

#[test]
fn test_stats_follow_traffic() {
    let mut codec = codec();
    for id in 0..3 {
        let frame = codec.encode(&Packet::new(2, ping(id))).unwrap();
        codec.decode(frame).unwrap();
    }
    let pong = messages::pong_reply(&ping(0));
    codec.encode(&Packet::new(3, pong)).unwrap();

    let stats = codec.into_stats();
    assert_eq!(stats.entry(PacketId::PING).unwrap().received.count, 3);
    assert_eq!(stats.entry(PacketId::PONG).unwrap().sent.count, 1);
    assert_eq!(stats.total_sent(), 4);
}

// =========================================================================
// Rejections
// =========================================================================

#[test]
fn test_unknown_id_rejected() {
    let err = codec().decode(RawFrame::new(4242, vec![0; 4])).unwrap_err();
    assert!(matches!(err, ProtocolError::UnknownPacket(PacketId(4242))));
}

#[test]
fn test_payload_over_packet_max_rejected() {
    let err = codec().decode(RawFrame::new(2, vec![0; 30])).unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::PayloadTooLarge {
            packet: "Ping",
            len: 30,
            max: 29
        }
    ));
}

#[test]
fn test_short_payload_fails_validation() {
    match codec().decode(RawFrame::new(2, vec![0; 28])) {
        Err(ProtocolError::Validation { source, .. }) => {
            assert!(matches!(source.kind(), DecodeErrorKind::TruncatedHeader { .. }));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn test_bad_enum_reports_field_path() {
    let mut payload = vec![0u8; 20];
    // id, no time, then the PongType discriminant at offset 17.
    payload[17] = 9;
    match codec().decode(RawFrame::new(3, payload)) {
        Err(ProtocolError::Validation { packet, source }) => {
            assert_eq!(packet, "Pong");
            assert_eq!(source.field(), "Pong.type");
            assert_eq!(
                source.kind(),
                &DecodeErrorKind::InvalidDiscriminant {
                    name: "PongType",
                    value: 9
                }
            );
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}
