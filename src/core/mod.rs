//! # Core Protocol Components
//!
//! Low-level packet handling, codecs, and binary serialization.
//!
//! ## Components
//! - **Buffer**: little-endian read/write primitives with an all-or-nothing cursor
//! - **Payloads**: typed bodies for every known BNCS command
//! - **Packet**: the tagged union over those bodies and the frame layer
//! - **Codec**: Tokio codec for framing over byte streams
//!
//! ## Wire Format
//! ```text
//! [0xFF] [Command(1)] [Length(2)] [Payload(Length - 4)]
//! ```
//!
//! ## Security
//! - Frames are bounded by the u16 length field (64 KiB)
//! - Declared lengths are validated before any payload is read
//! - Key counts and other repeat fields are bounded by the bytes present

pub mod buffer;
pub mod codec;
pub mod packet;
pub mod payloads;
