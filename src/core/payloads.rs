//! # BNCS Payloads
//!
//! Typed payloads for every known BNCS command, each with a symmetric
//! `encode`/`decode` pair over [`Buffer`].
//!
//! Decoders read only what their shape requires; [`Packet::deserialize`]
//! rejects frames with bytes left over.
//!
//! [`Packet::deserialize`]: crate::core::packet::Packet::deserialize

use crate::core::buffer::Buffer;
use crate::error::{constants, ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Four-character code such as `IX86` or `W3XP`, stored as the u32 the wire uses.
///
/// The first character is the most significant byte, so the little-endian
/// encoding reads backwards on the wire (`"68XI"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FourCC(pub u32);

impl FourCC {
    pub const fn from_bytes(code: [u8; 4]) -> Self {
        FourCC(u32::from_be_bytes(code))
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<&str> for FourCC {
    type Error = ProtocolError;

    fn try_from(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(FourCC(0));
        }
        let bytes: [u8; 4] = s.as_bytes().try_into().map_err(|_| {
            ProtocolError::ConfigError(format!("four-character code expected, got '{s}'"))
        })?;
        Ok(FourCC::from_bytes(bytes))
    }
}

impl TryFrom<String> for FourCC {
    type Error = ProtocolError;

    fn try_from(s: String) -> Result<Self> {
        FourCC::try_from(s.as_str())
    }
}

impl From<FourCC> for String {
    fn from(code: FourCC) -> Self {
        code.to_string()
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return Ok(());
        }
        let bytes = self.0.to_be_bytes();
        f.write_str(&String::from_utf8_lossy(&bytes))
    }
}

pub const PLATFORM_X86: FourCC = FourCC::from_bytes(*b"IX86");
pub const PRODUCT_ROC: FourCC = FourCC::from_bytes(*b"WAR3");
pub const PRODUCT_TFT: FourCC = FourCC::from_bytes(*b"W3XP");
pub const LANGUAGE_EN_US: FourCC = FourCC::from_bytes(*b"enUS");

/// Flag values for [`JoinChannel`].
pub mod join_flags {
    pub const NO_CREATE: u32 = 0x00;
    pub const FIRST_JOIN: u32 = 0x01;
    pub const FORCED: u32 = 0x02;
    pub const FIRST_JOIN_D2: u32 = 0x05;
}

/// Chat event classification carried by [`ChatEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatEventType {
    ShowUser,
    Join,
    Leave,
    Whisper,
    Talk,
    Broadcast,
    ChannelInfo,
    UserFlagsUpdate,
    WhisperSent,
    ChannelFull,
    ChannelDoesNotExist,
    ChannelRestricted,
    Info,
    Error,
    Emote,
    Other(u32),
}

impl From<u32> for ChatEventType {
    fn from(v: u32) -> Self {
        match v {
            0x01 => ChatEventType::ShowUser,
            0x02 => ChatEventType::Join,
            0x03 => ChatEventType::Leave,
            0x04 => ChatEventType::Whisper,
            0x05 => ChatEventType::Talk,
            0x06 => ChatEventType::Broadcast,
            0x07 => ChatEventType::ChannelInfo,
            0x09 => ChatEventType::UserFlagsUpdate,
            0x0A => ChatEventType::WhisperSent,
            0x0D => ChatEventType::ChannelFull,
            0x0E => ChatEventType::ChannelDoesNotExist,
            0x0F => ChatEventType::ChannelRestricted,
            0x12 => ChatEventType::Info,
            0x13 => ChatEventType::Error,
            0x17 => ChatEventType::Emote,
            other => ChatEventType::Other(other),
        }
    }
}

impl From<ChatEventType> for u32 {
    fn from(v: ChatEventType) -> Self {
        match v {
            ChatEventType::ShowUser => 0x01,
            ChatEventType::Join => 0x02,
            ChatEventType::Leave => 0x03,
            ChatEventType::Whisper => 0x04,
            ChatEventType::Talk => 0x05,
            ChatEventType::Broadcast => 0x06,
            ChatEventType::ChannelInfo => 0x07,
            ChatEventType::UserFlagsUpdate => 0x09,
            ChatEventType::WhisperSent => 0x0A,
            ChatEventType::ChannelFull => 0x0D,
            ChatEventType::ChannelDoesNotExist => 0x0E,
            ChatEventType::ChannelRestricted => 0x0F,
            ChatEventType::Info => 0x12,
            ChatEventType::Error => 0x13,
            ChatEventType::Emote => 0x17,
            ChatEventType::Other(other) => other,
        }
    }
}

// Defunct ChatEvent fields; servers fill them with this marker.
const DEFUNCT_FIELD: u32 = 0xBAAD_F00D;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ping {
    pub payload: u32,
}

impl Ping {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_u32(self.payload);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        Ok(Self {
            payload: buf.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnterChatReq {
    pub username: String,
    pub stat_string: String,
}

impl EnterChatReq {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_cstring(&self.username);
        buf.write_cstring(&self.stat_string);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        Ok(Self {
            username: buf.read_cstring()?,
            stat_string: buf.read_cstring()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnterChatResp {
    pub unique_name: String,
    pub stat_string: String,
    pub account_name: String,
}

impl EnterChatResp {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_cstring(&self.unique_name);
        buf.write_cstring(&self.stat_string);
        buf.write_cstring(&self.account_name);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        Ok(Self {
            unique_name: buf.read_cstring()?,
            stat_string: buf.read_cstring()?,
            account_name: buf.read_cstring()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinChannel {
    pub flag: u32,
    pub channel: String,
}

impl JoinChannel {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_u32(self.flag);
        buf.write_cstring(&self.channel);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        Ok(Self {
            flag: buf.read_u32()?,
            channel: buf.read_cstring()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatCommand {
    pub text: String,
}

impl ChatCommand {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_cstring(&self.text);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        Ok(Self {
            text: buf.read_cstring()?,
        })
    }
}

/// Server-pushed chat event. The flags field holds channel flags for
/// [`ChatEventType::ChannelInfo`] and user flags otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub event_type: ChatEventType,
    pub user_flags: u32,
    pub channel_flags: u32,
    pub ping: u32,
    pub username: String,
    pub text: String,
}

impl ChatEvent {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_u32(self.event_type.into());
        if self.event_type == ChatEventType::ChannelInfo {
            buf.write_u32(self.channel_flags);
        } else {
            buf.write_u32(self.user_flags);
        }
        buf.write_u32(self.ping);
        buf.write_u32(0);
        buf.write_u32(DEFUNCT_FIELD);
        buf.write_u32(DEFUNCT_FIELD);
        buf.write_cstring(&self.username);
        buf.write_cstring(&self.text);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        let event_type = ChatEventType::from(buf.read_u32()?);
        let flags = buf.read_u32()?;
        let ping = buf.read_u32()?;
        // ip, account number, registration authority
        let _ = buf.read_array::<12>()?;

        let (user_flags, channel_flags) = if event_type == ChatEventType::ChannelInfo {
            (0, flags)
        } else {
            (flags, 0)
        };

        Ok(Self {
            event_type,
            user_flags,
            channel_flags,
            ping,
            username: buf.read_cstring()?,
            text: buf.read_cstring()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetGamePort {
    pub port: u16,
}

impl NetGamePort {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_u16(self.port);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        Ok(Self {
            port: buf.read_u16()?,
        })
    }
}

/// Product and version pair advertised in [`AuthInfoReq`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameVersion {
    pub product: FourCC,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfoReq {
    pub protocol_id: u32,
    pub platform_code: FourCC,
    pub game_version: GameVersion,
    pub language_code: FourCC,
    pub local_ip: Ipv4Addr,
    pub time_zone_bias: u32,
    pub mpq_locale_id: u32,
    pub user_language_id: u32,
    pub country_abbreviation: String,
    pub country: String,
}

impl AuthInfoReq {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_u32(self.protocol_id);
        buf.write_u32(self.platform_code.0);
        buf.write_u32(self.game_version.product.0);
        buf.write_u32(self.game_version.version);
        buf.write_u32(self.language_code.0);
        buf.write_bytes(&self.local_ip.octets());
        buf.write_u32(self.time_zone_bias);
        buf.write_u32(self.mpq_locale_id);
        buf.write_u32(self.user_language_id);
        buf.write_cstring(&self.country_abbreviation);
        buf.write_cstring(&self.country);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        Ok(Self {
            protocol_id: buf.read_u32()?,
            platform_code: FourCC(buf.read_u32()?),
            game_version: GameVersion {
                product: FourCC(buf.read_u32()?),
                version: buf.read_u32()?,
            },
            language_code: FourCC(buf.read_u32()?),
            local_ip: Ipv4Addr::from(buf.read_array::<4>()?),
            time_zone_bias: buf.read_u32()?,
            mpq_locale_id: buf.read_u32()?,
            user_language_id: buf.read_u32()?,
            country_abbreviation: buf.read_cstring()?,
            country: buf.read_cstring()?,
        })
    }
}

pub const SERVER_SIGNATURE_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfoResp {
    pub logon_type: u32,
    pub server_token: u32,
    pub udp_value: u32,
    pub mpq_file_time: u64,
    pub mpq_file_name: String,
    pub value_string: Vec<u8>,
    pub server_signature: Option<[u8; SERVER_SIGNATURE_LEN]>,
}

impl AuthInfoResp {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_u32(self.logon_type);
        buf.write_u32(self.server_token);
        buf.write_u32(self.udp_value);
        buf.write_u64(self.mpq_file_time);
        buf.write_cstring(&self.mpq_file_name);
        buf.write_cbytes(&self.value_string);
        if let Some(sig) = &self.server_signature {
            buf.write_bytes(sig);
        }
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        let logon_type = buf.read_u32()?;
        let server_token = buf.read_u32()?;
        let udp_value = buf.read_u32()?;
        let mpq_file_time = buf.read_u64()?;
        let mpq_file_name = buf.read_cstring()?;
        let value_string = buf.read_cbytes()?;

        let server_signature = match buf.remaining() {
            0 => None,
            SERVER_SIGNATURE_LEN => Some(buf.read_array::<SERVER_SIGNATURE_LEN>()?),
            _ => {
                return Err(ProtocolError::InvalidPacket(
                    constants::ERR_BAD_SIGNATURE_LEN.into(),
                ))
            }
        };

        Ok(Self {
            logon_type,
            server_token,
            udp_value,
            mpq_file_time,
            mpq_file_name,
            value_string,
            server_signature,
        })
    }
}

/// Proof of CD key ownership, as produced by a [`KeyDecoder`].
///
/// [`KeyDecoder`]: crate::external::KeyDecoder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CdKey {
    pub key_length: u32,
    pub product_value: u32,
    pub public_value: u32,
    pub hashed_key_data: [u8; 20],
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthCheckReq {
    pub client_token: u32,
    pub exe_version: u32,
    pub exe_hash: u32,
    pub cd_keys: Vec<CdKey>,
    pub spawn: bool,
    pub exe_information: String,
    pub key_owner_name: String,
}

impl AuthCheckReq {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_u32(self.client_token);
        buf.write_u32(self.exe_version);
        buf.write_u32(self.exe_hash);
        buf.write_u32(self.cd_keys.len() as u32);
        buf.write_u32(u32::from(self.spawn));
        for key in &self.cd_keys {
            buf.write_u32(key.key_length);
            buf.write_u32(key.product_value);
            buf.write_u32(key.public_value);
            buf.write_u32(0);
            buf.write_bytes(&key.hashed_key_data);
        }
        buf.write_cstring(&self.exe_information);
        buf.write_cstring(&self.key_owner_name);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        let client_token = buf.read_u32()?;
        let exe_version = buf.read_u32()?;
        let exe_hash = buf.read_u32()?;
        let num_keys = buf.read_u32()? as usize;
        let spawn = buf.read_u32()? != 0;

        // Each key is 36 bytes; bound the allocation by what is actually present.
        if num_keys.saturating_mul(36) > buf.remaining() {
            return Err(ProtocolError::InsufficientData {
                needed: num_keys.saturating_mul(36),
                available: buf.remaining(),
            });
        }

        let mut cd_keys = Vec::with_capacity(num_keys);
        for _ in 0..num_keys {
            let key_length = buf.read_u32()?;
            let product_value = buf.read_u32()?;
            let public_value = buf.read_u32()?;
            let _ = buf.read_u32()?;
            cd_keys.push(CdKey {
                key_length,
                product_value,
                public_value,
                hashed_key_data: buf.read_array()?,
            });
        }

        Ok(Self {
            client_token,
            exe_version,
            exe_hash,
            cd_keys,
            spawn,
            exe_information: buf.read_cstring()?,
            key_owner_name: buf.read_cstring()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthCheckResp {
    pub result: u32,
    pub additional_info: String,
}

impl AuthCheckResp {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_u32(self.result);
        buf.write_cstring(&self.additional_info);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        Ok(Self {
            result: buf.read_u32()?,
            additional_info: buf.read_cstring()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthAccountCreateReq {
    pub salt: [u8; 32],
    pub verifier: [u8; 32],
    pub username: String,
}

impl AuthAccountCreateReq {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_bytes(&self.salt);
        buf.write_bytes(&self.verifier);
        buf.write_cstring(&self.username);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        Ok(Self {
            salt: buf.read_array()?,
            verifier: buf.read_array()?,
            username: buf.read_cstring()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthAccountCreateResp {
    pub result: u32,
}

impl AuthAccountCreateResp {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_u32(self.result);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        Ok(Self {
            result: buf.read_u32()?,
        })
    }
}

/// Also the request shape of the change-password exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthAccountLogonReq {
    pub client_key: [u8; 32],
    pub username: String,
}

impl AuthAccountLogonReq {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_bytes(&self.client_key);
        buf.write_cstring(&self.username);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        Ok(Self {
            client_key: buf.read_array()?,
            username: buf.read_cstring()?,
        })
    }
}

/// Also the response shape of the change-password exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthAccountLogonResp {
    pub result: u32,
    pub salt: [u8; 32],
    pub server_key: [u8; 32],
}

impl AuthAccountLogonResp {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_u32(self.result);
        buf.write_bytes(&self.salt);
        buf.write_bytes(&self.server_key);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        Ok(Self {
            result: buf.read_u32()?,
            salt: buf.read_array()?,
            server_key: buf.read_array()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthAccountLogonProofReq {
    pub client_password_proof: [u8; 20],
}

impl AuthAccountLogonProofReq {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_bytes(&self.client_password_proof);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        Ok(Self {
            client_password_proof: buf.read_array()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthAccountLogonProofResp {
    pub result: u32,
    pub server_password_proof: [u8; 20],
    pub additional_information: String,
}

impl AuthAccountLogonProofResp {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_u32(self.result);
        buf.write_bytes(&self.server_password_proof);
        buf.write_cstring(&self.additional_information);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        Ok(Self {
            result: buf.read_u32()?,
            server_password_proof: buf.read_array()?,
            additional_information: buf.read_cstring()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthAccountChangePassProofReq {
    pub client_password_proof: [u8; 20],
    pub new_salt: [u8; 32],
    pub new_verifier: [u8; 32],
}

impl AuthAccountChangePassProofReq {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_bytes(&self.client_password_proof);
        buf.write_bytes(&self.new_salt);
        buf.write_bytes(&self.new_verifier);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        Ok(Self {
            client_password_proof: buf.read_array()?,
            new_salt: buf.read_array()?,
            new_verifier: buf.read_array()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthAccountChangePassProofResp {
    pub result: u32,
    pub server_password_proof: [u8; 20],
}

impl AuthAccountChangePassProofResp {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_u32(self.result);
        buf.write_bytes(&self.server_password_proof);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        Ok(Self {
            result: buf.read_u32()?,
            server_password_proof: buf.read_array()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetEmail {
    pub email_address: String,
}

impl SetEmail {
    pub fn encode(&self, buf: &mut Buffer) {
        buf.write_cstring(&self.email_address);
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self> {
        Ok(Self {
            email_address: buf.read_cstring()?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_wire_order() {
        let mut buf = Buffer::new();
        buf.write_u32(PLATFORM_X86.0);
        assert_eq!(buf.as_slice(), b"68XI");
        assert_eq!(PLATFORM_X86.to_string(), "IX86");
        assert_eq!(FourCC::try_from("W3XP").unwrap(), PRODUCT_TFT);
        assert!(FourCC::try_from("TOOLONG").is_err());
        assert!(FourCC::try_from("").unwrap().is_zero());
    }

    #[test]
    fn test_chat_event_type_codes() {
        for code in 0..0x20u32 {
            assert_eq!(u32::from(ChatEventType::from(code)), code);
        }
        assert_eq!(ChatEventType::from(0x17), ChatEventType::Emote);
    }

    #[test]
    fn test_channel_info_flags_slot() {
        let ev = ChatEvent {
            event_type: ChatEventType::ChannelInfo,
            user_flags: 0,
            channel_flags: 0x1234,
            ping: 0,
            username: String::new(),
            text: "W3".into(),
        };
        let mut buf = Buffer::new();
        ev.encode(&mut buf);
        assert_eq!(&buf.as_slice()[4..8], &0x1234u32.to_le_bytes());
        assert_eq!(ChatEvent::decode(&mut buf).unwrap(), ev);
    }

    #[test]
    fn test_auth_info_signature_length() {
        let resp = AuthInfoResp {
            logon_type: 2,
            server_token: 1,
            udp_value: 0,
            mpq_file_time: 0,
            mpq_file_name: "ver-IX86-1.mpq".into(),
            value_string: b"A=1 B=2".to_vec(),
            server_signature: None,
        };
        let mut buf = Buffer::new();
        resp.encode(&mut buf);
        buf.write_bytes(&[0u8; 12]);
        assert!(matches!(
            AuthInfoResp::decode(&mut buf),
            Err(ProtocolError::InvalidPacket(_))
        ));
    }

    #[test]
    fn test_auth_check_key_count_bounded() {
        let mut buf = Buffer::new();
        for v in [1u32, 2, 3, u32::MAX, 0] {
            buf.write_u32(v);
        }
        assert!(matches!(
            AuthCheckReq::decode(&mut buf),
            Err(ProtocolError::InsufficientData { .. })
        ));
    }
}
