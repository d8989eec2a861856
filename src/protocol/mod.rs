//! # Protocol Layer
//!
//! Everything above framing: events and their dispatch, server result
//! codes, and the logon handshake.
//!
//! ## Components
//! - **Dispatcher**: Event bus keyed by event shape
//! - **Event**: Packet and chat-membership events
//! - **Handshake**: Version check, CD key proof, password proof, chat entry
//! - **Results**: Server result codes mapped to [`Rejection`](results::Rejection)
//!
//! ## Trust
//! A password proof the server cannot back up with a matching counter-proof
//! fails the logon even when the server reports success.

pub mod dispatcher;
pub mod event;
pub mod handshake;
pub mod results;

pub use dispatcher::{Dispatcher, WeakDispatcher};
pub use event::{AsyncError, Channel, Chat, Event, EventKind, User, Whisper};
pub use handshake::{exchange, Handshake, HandshakeState};
