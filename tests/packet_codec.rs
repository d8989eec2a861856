//! Round-trip and truncation tests for every packet shape.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use bncs_protocol::core::buffer::Buffer;
use bncs_protocol::core::codec::BncsCodec;
use bncs_protocol::core::packet::{Encoding, Packet, HEADER_SIZE};
use bncs_protocol::core::payloads::*;
use bncs_protocol::error::ProtocolError;
use bytes::BytesMut;
use std::net::Ipv4Addr;
use tokio_util::codec::{Decoder, Encoder};

fn key(seed: u8) -> [u8; 32] {
    std::array::from_fn(|i| seed.wrapping_add(i as u8))
}

fn proof(seed: u8) -> [u8; 20] {
    std::array::from_fn(|i| seed ^ i as u8)
}

/// Packets clients send, decoded with request encoding.
fn requests() -> Vec<Packet> {
    vec![
        Packet::KeepAlive,
        Packet::Ping(Ping { payload: 0x1234_5678 }),
        Packet::EnterChatReq(EnterChatReq::default()),
        Packet::JoinChannel(JoinChannel {
            flag: join_flags::FIRST_JOIN,
            channel: "W3".into(),
        }),
        Packet::ChatCommand(ChatCommand {
            text: "/whois someone".into(),
        }),
        Packet::NetGamePort(NetGamePort { port: 6112 }),
        Packet::AuthInfoReq(AuthInfoReq {
            protocol_id: 0,
            platform_code: PLATFORM_X86,
            game_version: GameVersion {
                product: PRODUCT_TFT,
                version: 26,
            },
            language_code: LANGUAGE_EN_US,
            local_ip: Ipv4Addr::new(192, 168, 1, 20),
            time_zone_bias: 4_294_967_176,
            mpq_locale_id: 1033,
            user_language_id: 1033,
            country_abbreviation: "USA".into(),
            country: "United States".into(),
        }),
        Packet::AuthCheckReq(AuthCheckReq {
            client_token: 0x5F00_0000,
            exe_version: 0x011A_0001,
            exe_hash: 0xCAFE_F00D,
            cd_keys: vec![
                CdKey {
                    key_length: 26,
                    product_value: 0x0E,
                    public_value: 0x00AB_CDEF,
                    hashed_key_data: proof(1),
                },
                CdKey {
                    key_length: 26,
                    product_value: 0x12,
                    public_value: 0x0012_3456,
                    hashed_key_data: proof(2),
                },
            ],
            spawn: false,
            exe_information: "war3.exe 03/18/11 20:03:55 471040".into(),
            key_owner_name: "bncs-protocol".into(),
        }),
        Packet::AuthAccountCreateReq(AuthAccountCreateReq {
            salt: key(3),
            verifier: key(4),
            username: "someone".into(),
        }),
        Packet::AuthAccountLogonReq(AuthAccountLogonReq {
            client_key: key(5),
            username: "someone".into(),
        }),
        Packet::AuthAccountLogonProofReq(AuthAccountLogonProofReq {
            client_password_proof: proof(6),
        }),
        Packet::AuthAccountChangePassReq(AuthAccountLogonReq {
            client_key: key(7),
            username: "someone".into(),
        }),
        Packet::AuthAccountChangePassProofReq(AuthAccountChangePassProofReq {
            client_password_proof: proof(8),
            new_salt: key(9),
            new_verifier: key(10),
        }),
        Packet::SetEmail(SetEmail {
            email_address: String::new(),
        }),
    ]
}

/// Packets servers send, decoded with response encoding.
fn responses() -> Vec<Packet> {
    vec![
        Packet::KeepAlive,
        Packet::Ping(Ping { payload: 7 }),
        Packet::EnterChatResp(EnterChatResp {
            unique_name: "someone#2".into(),
            stat_string: "PX3W 1 0".into(),
            account_name: "someone".into(),
        }),
        Packet::ChatEvent(ChatEvent {
            event_type: ChatEventType::ChannelInfo,
            user_flags: 0,
            channel_flags: 0x18,
            ping: 0,
            username: "someone#2".into(),
            text: "Frozen Throne USA-1".into(),
        }),
        Packet::ChatEvent(ChatEvent {
            event_type: ChatEventType::Talk,
            user_flags: 0x10,
            channel_flags: 0,
            ping: 62,
            username: "other".into(),
            text: "hello".into(),
        }),
        Packet::AuthInfoResp(AuthInfoResp {
            logon_type: 2,
            server_token: 0xDEAD_BEEF,
            udp_value: 0x1_0000,
            mpq_file_time: 0x01C5_0B25_DEAF_6400,
            mpq_file_name: "ver-IX86-1.mpq".into(),
            value_string: b"A=1 B=2 C=3 4 A=A+S B=B-C C=C^A A=A^B".to_vec(),
            server_signature: Some([0x5A; SERVER_SIGNATURE_LEN]),
        }),
        Packet::AuthInfoResp(AuthInfoResp {
            logon_type: 2,
            server_token: 1,
            udp_value: 0,
            mpq_file_time: 0,
            mpq_file_name: "IX86ver3.mpq".into(),
            value_string: vec![0x01, 0x02, 0xFE],
            server_signature: None,
        }),
        Packet::AuthCheckResp(AuthCheckResp {
            result: 0x201,
            additional_info: "owner".into(),
        }),
        Packet::AuthAccountCreateResp(AuthAccountCreateResp { result: 0 }),
        Packet::AuthAccountLogonResp(AuthAccountLogonResp {
            result: 0,
            salt: key(11),
            server_key: key(12),
        }),
        Packet::AuthAccountLogonProofResp(AuthAccountLogonProofResp {
            result: 0x0F,
            server_password_proof: proof(13),
            additional_information: "closed for maintenance".into(),
        }),
        Packet::AuthAccountChangePassResp(AuthAccountLogonResp {
            result: 1,
            salt: key(14),
            server_key: key(15),
        }),
        Packet::AuthAccountChangePassProofResp(AuthAccountChangePassProofResp {
            result: 0,
            server_password_proof: proof(16),
        }),
    ]
}

fn all() -> impl Iterator<Item = (Packet, Encoding)> {
    requests()
        .into_iter()
        .map(|p| (p, Encoding::REQUEST))
        .chain(responses().into_iter().map(|p| (p, Encoding::RESPONSE)))
}

#[test]
fn test_every_shape_roundtrips() {
    for (packet, encoding) in all() {
        let bytes = packet.serialize().unwrap();
        assert_eq!(bytes.len(), packet.encoded_len(), "{packet:?}");
        assert_eq!(
            u16::from_le_bytes([bytes[2], bytes[3]]) as usize,
            bytes.len(),
            "{packet:?}"
        );

        let mut buf = Buffer::from(bytes);
        let decoded = Packet::deserialize(&mut buf, encoding).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(buf.remaining(), 0, "{packet:?} left bytes unread");
    }
}

#[test]
fn test_truncated_frames_fail_cleanly() {
    for (packet, encoding) in all() {
        let bytes = packet.serialize().unwrap();
        for cut in 0..bytes.len() {
            let mut buf = Buffer::from(bytes[..cut].to_vec());
            match Packet::deserialize(&mut buf, encoding) {
                Err(ProtocolError::InsufficientData { .. }) => {}
                other => panic!("{packet:?} cut at {cut}: {other:?}"),
            }
            assert_eq!(buf.remaining(), cut, "partial frame must not be consumed");
        }
    }
}

#[test]
fn test_truncated_payloads_fail_cleanly() {
    // Shrink the declared length so the decoder itself runs out of bytes.
    for (packet, encoding) in all() {
        let bytes = packet.serialize().unwrap();
        for cut in HEADER_SIZE..bytes.len() {
            let mut frame = bytes[..cut].to_vec();
            frame[2..4].copy_from_slice(&(cut as u16).to_le_bytes());
            let mut buf = Buffer::from(frame);
            match Packet::deserialize(&mut buf, encoding) {
                Err(_) => {}
                // The signature is optional, so dropping it whole is still valid.
                Ok(Packet::AuthInfoResp(AuthInfoResp {
                    server_signature: None,
                    ..
                })) if cut == bytes.len() - SERVER_SIGNATURE_LEN => {}
                Ok(other) => panic!("{packet:?} cut at {cut} decoded as {other:?}"),
            }
        }
    }
}

#[test]
fn test_codec_stream_of_frames() {
    let mut server = BncsCodec::server();
    let mut client = BncsCodec::client();

    let mut wire = BytesMut::new();
    for packet in responses() {
        server.encode(packet, &mut wire).unwrap();
    }

    let mut decoded = Vec::new();
    while let Some(packet) = client.decode(&mut wire).unwrap() {
        decoded.push(packet);
    }
    assert_eq!(decoded, responses());
    assert!(wire.is_empty());
}

#[test]
fn test_fourcc_wire_order() {
    let packet = Packet::AuthInfoReq(AuthInfoReq {
        protocol_id: 0,
        platform_code: PLATFORM_X86,
        game_version: GameVersion {
            product: PRODUCT_ROC,
            version: 26,
        },
        language_code: LANGUAGE_EN_US,
        local_ip: Ipv4Addr::UNSPECIFIED,
        time_zone_bias: 0,
        mpq_locale_id: 0,
        user_language_id: 0,
        country_abbreviation: String::new(),
        country: String::new(),
    });
    let bytes = packet.serialize().unwrap();
    assert_eq!(&bytes[8..12], b"68XI");
    assert_eq!(&bytes[12..16], b"3RAW");
    assert_eq!(&bytes[20..24], b"SUne");
}
