//! # BNCS Packet
//!
//! The closed set of packets the client speaks, plus the frame layer around
//! them.
//!
//! ## Wire Format
//! ```text
//! [0xFF] [Command(1)] [Length(2, LE, header included)] [Payload(Length - 4)]
//! ```
//!
//! Several command ids carry different shapes depending on direction, so
//! decoding takes an [`Encoding`] that says which side produced the frame.
//! Ids without a decoder in that direction come back as [`Packet::Unknown`].

use crate::core::buffer::Buffer;
use crate::core::payloads::*;
use crate::error::{constants, ProtocolError, Result};

/// Frame signature byte.
pub const SIGNATURE: u8 = 0xFF;

/// Size of `[signature][command][length]`.
pub const HEADER_SIZE: usize = 4;

/// Largest frame the u16 length field can describe.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Raw byte a client writes once, before its first frame, to select BNCS.
pub const PROTOCOL_GREETING: u8 = 0x01;

/// Command ids.
pub mod pid {
    pub const KEEP_ALIVE: u8 = 0x00;
    pub const ENTER_CHAT: u8 = 0x0A;
    pub const JOIN_CHANNEL: u8 = 0x0C;
    pub const CHAT_COMMAND: u8 = 0x0E;
    pub const CHAT_EVENT: u8 = 0x0F;
    pub const PING: u8 = 0x25;
    pub const NET_GAME_PORT: u8 = 0x45;
    pub const AUTH_INFO: u8 = 0x50;
    pub const AUTH_CHECK: u8 = 0x51;
    pub const AUTH_ACCOUNT_CREATE: u8 = 0x52;
    pub const AUTH_ACCOUNT_LOGON: u8 = 0x53;
    pub const AUTH_ACCOUNT_LOGON_PROOF: u8 = 0x54;
    pub const AUTH_ACCOUNT_CHANGE_PASS: u8 = 0x55;
    pub const AUTH_ACCOUNT_CHANGE_PASS_PROOF: u8 = 0x56;
    pub const SET_EMAIL: u8 = 0x59;
}

/// Which side of the connection produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Encoding {
    /// `true` for client-to-server frames.
    pub request: bool,
}

impl Encoding {
    pub const REQUEST: Encoding = Encoding { request: true };
    pub const RESPONSE: Encoding = Encoding { request: false };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    KeepAlive,
    Ping(Ping),
    EnterChatReq(EnterChatReq),
    EnterChatResp(EnterChatResp),
    JoinChannel(JoinChannel),
    ChatCommand(ChatCommand),
    ChatEvent(ChatEvent),
    NetGamePort(NetGamePort),
    AuthInfoReq(AuthInfoReq),
    AuthInfoResp(AuthInfoResp),
    AuthCheckReq(AuthCheckReq),
    AuthCheckResp(AuthCheckResp),
    AuthAccountCreateReq(AuthAccountCreateReq),
    AuthAccountCreateResp(AuthAccountCreateResp),
    AuthAccountLogonReq(AuthAccountLogonReq),
    AuthAccountLogonResp(AuthAccountLogonResp),
    AuthAccountLogonProofReq(AuthAccountLogonProofReq),
    AuthAccountLogonProofResp(AuthAccountLogonProofResp),
    AuthAccountChangePassReq(AuthAccountLogonReq),
    AuthAccountChangePassResp(AuthAccountLogonResp),
    AuthAccountChangePassProofReq(AuthAccountChangePassProofReq),
    AuthAccountChangePassProofResp(AuthAccountChangePassProofResp),
    SetEmail(SetEmail),
    /// Opaque frame for a command id this crate has no decoder for.
    Unknown { id: u8, payload: Vec<u8> },
}

/// Payload-free tag of a [`Packet`], used as a dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    KeepAlive,
    Ping,
    EnterChatReq,
    EnterChatResp,
    JoinChannel,
    ChatCommand,
    ChatEvent,
    NetGamePort,
    AuthInfoReq,
    AuthInfoResp,
    AuthCheckReq,
    AuthCheckResp,
    AuthAccountCreateReq,
    AuthAccountCreateResp,
    AuthAccountLogonReq,
    AuthAccountLogonResp,
    AuthAccountLogonProofReq,
    AuthAccountLogonProofResp,
    AuthAccountChangePassReq,
    AuthAccountChangePassResp,
    AuthAccountChangePassProofReq,
    AuthAccountChangePassProofResp,
    SetEmail,
    Unknown,
}

type DecodeFn = fn(&mut Buffer) -> Result<Packet>;

/// Decoder lookup by command id and direction.
fn decoder_for(id: u8, encoding: Encoding) -> Option<DecodeFn> {
    let decode: DecodeFn = match (id, encoding.request) {
        (pid::KEEP_ALIVE, _) => |_| Ok(Packet::KeepAlive),
        (pid::PING, _) => |b| Ping::decode(b).map(Packet::Ping),
        (pid::ENTER_CHAT, true) => |b| EnterChatReq::decode(b).map(Packet::EnterChatReq),
        (pid::ENTER_CHAT, false) => |b| EnterChatResp::decode(b).map(Packet::EnterChatResp),
        (pid::JOIN_CHANNEL, true) => |b| JoinChannel::decode(b).map(Packet::JoinChannel),
        (pid::CHAT_COMMAND, true) => |b| ChatCommand::decode(b).map(Packet::ChatCommand),
        (pid::CHAT_EVENT, false) => |b| ChatEvent::decode(b).map(Packet::ChatEvent),
        (pid::NET_GAME_PORT, true) => |b| NetGamePort::decode(b).map(Packet::NetGamePort),
        (pid::AUTH_INFO, true) => |b| AuthInfoReq::decode(b).map(Packet::AuthInfoReq),
        (pid::AUTH_INFO, false) => |b| AuthInfoResp::decode(b).map(Packet::AuthInfoResp),
        (pid::AUTH_CHECK, true) => |b| AuthCheckReq::decode(b).map(Packet::AuthCheckReq),
        (pid::AUTH_CHECK, false) => |b| AuthCheckResp::decode(b).map(Packet::AuthCheckResp),
        (pid::AUTH_ACCOUNT_CREATE, true) => {
            |b| AuthAccountCreateReq::decode(b).map(Packet::AuthAccountCreateReq)
        }
        (pid::AUTH_ACCOUNT_CREATE, false) => {
            |b| AuthAccountCreateResp::decode(b).map(Packet::AuthAccountCreateResp)
        }
        (pid::AUTH_ACCOUNT_LOGON, true) => {
            |b| AuthAccountLogonReq::decode(b).map(Packet::AuthAccountLogonReq)
        }
        (pid::AUTH_ACCOUNT_LOGON, false) => {
            |b| AuthAccountLogonResp::decode(b).map(Packet::AuthAccountLogonResp)
        }
        (pid::AUTH_ACCOUNT_LOGON_PROOF, true) => {
            |b| AuthAccountLogonProofReq::decode(b).map(Packet::AuthAccountLogonProofReq)
        }
        (pid::AUTH_ACCOUNT_LOGON_PROOF, false) => {
            |b| AuthAccountLogonProofResp::decode(b).map(Packet::AuthAccountLogonProofResp)
        }
        (pid::AUTH_ACCOUNT_CHANGE_PASS, true) => {
            |b| AuthAccountLogonReq::decode(b).map(Packet::AuthAccountChangePassReq)
        }
        (pid::AUTH_ACCOUNT_CHANGE_PASS, false) => {
            |b| AuthAccountLogonResp::decode(b).map(Packet::AuthAccountChangePassResp)
        }
        (pid::AUTH_ACCOUNT_CHANGE_PASS_PROOF, true) => |b| {
            AuthAccountChangePassProofReq::decode(b).map(Packet::AuthAccountChangePassProofReq)
        },
        (pid::AUTH_ACCOUNT_CHANGE_PASS_PROOF, false) => |b| {
            AuthAccountChangePassProofResp::decode(b).map(Packet::AuthAccountChangePassProofResp)
        },
        (pid::SET_EMAIL, true) => |b| SetEmail::decode(b).map(Packet::SetEmail),
        _ => return None,
    };
    Some(decode)
}

impl Packet {
    pub fn id(&self) -> u8 {
        match self {
            Packet::KeepAlive => pid::KEEP_ALIVE,
            Packet::Ping(_) => pid::PING,
            Packet::EnterChatReq(_) | Packet::EnterChatResp(_) => pid::ENTER_CHAT,
            Packet::JoinChannel(_) => pid::JOIN_CHANNEL,
            Packet::ChatCommand(_) => pid::CHAT_COMMAND,
            Packet::ChatEvent(_) => pid::CHAT_EVENT,
            Packet::NetGamePort(_) => pid::NET_GAME_PORT,
            Packet::AuthInfoReq(_) | Packet::AuthInfoResp(_) => pid::AUTH_INFO,
            Packet::AuthCheckReq(_) | Packet::AuthCheckResp(_) => pid::AUTH_CHECK,
            Packet::AuthAccountCreateReq(_) | Packet::AuthAccountCreateResp(_) => {
                pid::AUTH_ACCOUNT_CREATE
            }
            Packet::AuthAccountLogonReq(_) | Packet::AuthAccountLogonResp(_) => {
                pid::AUTH_ACCOUNT_LOGON
            }
            Packet::AuthAccountLogonProofReq(_) | Packet::AuthAccountLogonProofResp(_) => {
                pid::AUTH_ACCOUNT_LOGON_PROOF
            }
            Packet::AuthAccountChangePassReq(_) | Packet::AuthAccountChangePassResp(_) => {
                pid::AUTH_ACCOUNT_CHANGE_PASS
            }
            Packet::AuthAccountChangePassProofReq(_)
            | Packet::AuthAccountChangePassProofResp(_) => pid::AUTH_ACCOUNT_CHANGE_PASS_PROOF,
            Packet::SetEmail(_) => pid::SET_EMAIL,
            Packet::Unknown { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::KeepAlive => PacketKind::KeepAlive,
            Packet::Ping(_) => PacketKind::Ping,
            Packet::EnterChatReq(_) => PacketKind::EnterChatReq,
            Packet::EnterChatResp(_) => PacketKind::EnterChatResp,
            Packet::JoinChannel(_) => PacketKind::JoinChannel,
            Packet::ChatCommand(_) => PacketKind::ChatCommand,
            Packet::ChatEvent(_) => PacketKind::ChatEvent,
            Packet::NetGamePort(_) => PacketKind::NetGamePort,
            Packet::AuthInfoReq(_) => PacketKind::AuthInfoReq,
            Packet::AuthInfoResp(_) => PacketKind::AuthInfoResp,
            Packet::AuthCheckReq(_) => PacketKind::AuthCheckReq,
            Packet::AuthCheckResp(_) => PacketKind::AuthCheckResp,
            Packet::AuthAccountCreateReq(_) => PacketKind::AuthAccountCreateReq,
            Packet::AuthAccountCreateResp(_) => PacketKind::AuthAccountCreateResp,
            Packet::AuthAccountLogonReq(_) => PacketKind::AuthAccountLogonReq,
            Packet::AuthAccountLogonResp(_) => PacketKind::AuthAccountLogonResp,
            Packet::AuthAccountLogonProofReq(_) => PacketKind::AuthAccountLogonProofReq,
            Packet::AuthAccountLogonProofResp(_) => PacketKind::AuthAccountLogonProofResp,
            Packet::AuthAccountChangePassReq(_) => PacketKind::AuthAccountChangePassReq,
            Packet::AuthAccountChangePassResp(_) => PacketKind::AuthAccountChangePassResp,
            Packet::AuthAccountChangePassProofReq(_) => PacketKind::AuthAccountChangePassProofReq,
            Packet::AuthAccountChangePassProofResp(_) => {
                PacketKind::AuthAccountChangePassProofResp
            }
            Packet::SetEmail(_) => PacketKind::SetEmail,
            Packet::Unknown { .. } => PacketKind::Unknown,
        }
    }

    fn encode_payload(&self, buf: &mut Buffer) {
        match self {
            Packet::KeepAlive => {}
            Packet::Ping(p) => p.encode(buf),
            Packet::EnterChatReq(p) => p.encode(buf),
            Packet::EnterChatResp(p) => p.encode(buf),
            Packet::JoinChannel(p) => p.encode(buf),
            Packet::ChatCommand(p) => p.encode(buf),
            Packet::ChatEvent(p) => p.encode(buf),
            Packet::NetGamePort(p) => p.encode(buf),
            Packet::AuthInfoReq(p) => p.encode(buf),
            Packet::AuthInfoResp(p) => p.encode(buf),
            Packet::AuthCheckReq(p) => p.encode(buf),
            Packet::AuthCheckResp(p) => p.encode(buf),
            Packet::AuthAccountCreateReq(p) => p.encode(buf),
            Packet::AuthAccountCreateResp(p) => p.encode(buf),
            Packet::AuthAccountLogonReq(p) | Packet::AuthAccountChangePassReq(p) => p.encode(buf),
            Packet::AuthAccountLogonResp(p) | Packet::AuthAccountChangePassResp(p) => {
                p.encode(buf)
            }
            Packet::AuthAccountLogonProofReq(p) => p.encode(buf),
            Packet::AuthAccountLogonProofResp(p) => p.encode(buf),
            Packet::AuthAccountChangePassProofReq(p) => p.encode(buf),
            Packet::AuthAccountChangePassProofResp(p) => p.encode(buf),
            Packet::SetEmail(p) => p.encode(buf),
            Packet::Unknown { payload, .. } => buf.write_bytes(payload),
        }
    }

    /// Size of the frame this packet serializes to.
    pub fn encoded_len(&self) -> usize {
        let mut payload = Buffer::new();
        self.encode_payload(&mut payload);
        HEADER_SIZE + payload.len()
    }

    /// Append one complete frame to `buf`.
    ///
    /// The length field is written as a placeholder and backfilled once the
    /// payload size is known. On error `buf` is restored to its prior length.
    pub fn serialize_into(&self, buf: &mut Buffer) -> Result<()> {
        let start = buf.len();
        buf.write_u8(SIGNATURE);
        buf.write_u8(self.id());
        buf.write_u16(0);
        self.encode_payload(buf);

        let size = buf.len() - start;
        if size > MAX_FRAME_SIZE {
            buf.truncate_to(start);
            return Err(ProtocolError::OversizedPacket(size));
        }
        buf.put_u16_at(start + 2, size as u16)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Buffer::with_capacity(64);
        self.serialize_into(&mut buf)?;
        Ok(buf.into_vec())
    }

    /// Read the declared frame length, if a full header is present.
    ///
    /// Fails on a signature mismatch or a length smaller than the header.
    pub fn peek_frame_len(bytes: &[u8]) -> Result<Option<usize>> {
        if bytes.is_empty() {
            return Ok(None);
        }
        if bytes[0] != SIGNATURE {
            return Err(ProtocolError::InvalidHeader);
        }
        if bytes.len() < HEADER_SIZE {
            return Ok(None);
        }
        let len = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
        if len < HEADER_SIZE {
            return Err(ProtocolError::InvalidHeader);
        }
        Ok(Some(len))
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Nothing is consumed unless a whole frame is present. The payload is
    /// copied out before decoding, so `buf` may be truncated right after.
    pub fn deserialize(buf: &mut Buffer, encoding: Encoding) -> Result<Packet> {
        let available = buf.remaining();
        let size = match Self::peek_frame_len(buf.as_slice())? {
            Some(size) => size,
            None => {
                return Err(ProtocolError::InsufficientData {
                    needed: HEADER_SIZE,
                    available,
                })
            }
        };
        if size > available {
            return Err(ProtocolError::InsufficientData {
                needed: size,
                available,
            });
        }

        let header = buf.read_array::<HEADER_SIZE>()?;
        let id = header[1];
        let payload = buf.read_bytes(size - HEADER_SIZE)?;

        let Some(decode) = decoder_for(id, encoding) else {
            return Ok(Packet::Unknown { id, payload });
        };

        let mut body = Buffer::from(payload);
        let packet = decode(&mut body)?;
        if !body.is_empty() {
            return Err(ProtocolError::InvalidPacket(format!(
                "{} (command 0x{id:02X}, {} bytes)",
                constants::ERR_TRAILING_BYTES,
                body.remaining()
            )));
        }
        Ok(packet)
    }
}
