//! # BNCS Codec
//!
//! Tokio codec that frames a byte stream into [`Packet`]s.
//!
//! `decode` returns `Ok(None)` until a complete frame is buffered, so partial
//! reads are handled by `FramedRead` without any extra state here. A bad
//! signature or a length below the header size is a hard error: the stream
//! has lost sync and cannot be recovered.

use crate::core::buffer::Buffer;
use crate::core::packet::{Encoding, Packet};
use crate::error::ProtocolError;
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug)]
pub struct BncsCodec {
    encoding: Encoding,
    scratch: Buffer,
}

impl BncsCodec {
    /// Codec for the client side: decodes server frames.
    pub fn client() -> Self {
        Self::new(Encoding::RESPONSE)
    }

    /// Codec for the server side: decodes client frames.
    pub fn server() -> Self {
        Self::new(Encoding::REQUEST)
    }

    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            scratch: Buffer::with_capacity(256),
        }
    }
}

impl Default for BncsCodec {
    fn default() -> Self {
        Self::client()
    }
}

impl Decoder for BncsCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(frame_len) = Packet::peek_frame_len(src)? else {
            return Ok(None);
        };

        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let frame = src.split_to(frame_len);
        self.scratch.clear();
        self.scratch.write_bytes(&frame);
        Packet::deserialize(&mut self.scratch, self.encoding).map(Some)
    }
}

impl Encoder<Packet> for BncsCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        Encoder::<&Packet>::encode(self, &item, dst)
    }
}

impl Encoder<&Packet> for BncsCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.scratch.clear();
        item.serialize_into(&mut self.scratch)?;
        dst.extend_from_slice(self.scratch.as_slice());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::payloads::Ping;

    #[test]
    fn test_partial_then_complete() {
        let mut codec = BncsCodec::client();
        let bytes = Packet::Ping(Ping { payload: 42 }).serialize().unwrap();

        let mut src = BytesMut::new();
        for &b in &bytes[..bytes.len() - 1] {
            src.extend_from_slice(&[b]);
            assert!(codec.decode(&mut src).unwrap().is_none());
        }
        src.extend_from_slice(&bytes[bytes.len() - 1..]);
        assert_eq!(
            codec.decode(&mut src).unwrap(),
            Some(Packet::Ping(Ping { payload: 42 }))
        );
        assert!(src.is_empty());
    }

    #[test]
    fn test_desync_is_fatal() {
        let mut codec = BncsCodec::client();
        let mut src = BytesMut::from(&[0x00u8, 0x25, 0x08, 0x00][..]);
        assert!(matches!(
            codec.decode(&mut src),
            Err(ProtocolError::InvalidHeader)
        ));
    }

    #[test]
    fn test_encode_appends() {
        let mut codec = BncsCodec::client();
        let mut dst = BytesMut::new();
        codec.encode(Packet::KeepAlive, &mut dst).unwrap();
        codec.encode(&Packet::KeepAlive, &mut dst).unwrap();
        assert_eq!(&dst[..], &[0xFF, 0, 4, 0, 0xFF, 0, 4, 0]);
    }
}
