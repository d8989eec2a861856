//! Events delivered through the [`Dispatcher`](super::dispatcher::Dispatcher).
//!
//! Every decoded packet is fired as [`Event::Packet`]. The client's own
//! handlers turn chat packets into the higher-level membership events.

use crate::core::packet::{Packet, PacketKind};
use crate::core::payloads::ChatEventType;
use crate::error::ProtocolError;
use std::time::SystemTime;

/// A user present in the current channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub stat_string: String,
    pub flags: u32,
    pub ping: u32,
    /// First sighting in this channel; kept across updates.
    pub joined: SystemTime,
    pub last_seen: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub user: User,
    pub content: String,
    /// Talk or emote.
    pub kind: ChatEventType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Whisper {
    pub username: String,
    pub content: String,
    pub flags: u32,
    pub ping: u32,
}

/// Error raised where no caller is waiting, such as inside the read loop or
/// the keep-alive task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncError {
    pub source: &'static str,
    pub message: String,
}

impl AsyncError {
    pub fn new(source: &'static str, err: &ProtocolError) -> Self {
        Self {
            source,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Packet(Packet),
    Channel(Channel),
    UserJoined {
        user: User,
        /// Listed as already present when we entered, not a fresh join.
        already_in_channel: bool,
    },
    UserUpdate(User),
    UserLeft(User),
    Chat(Chat),
    Whisper(Whisper),
    JoinError {
        channel: String,
        error: ChatEventType,
    },
    SystemMessage {
        content: String,
        kind: ChatEventType,
    },
    AsyncError(AsyncError),
    Disconnected,
}

/// Registration key for [`Event`] handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Packet(PacketKind),
    Channel,
    UserJoined,
    UserUpdate,
    UserLeft,
    Chat,
    Whisper,
    JoinError,
    SystemMessage,
    AsyncError,
    Disconnected,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Packet(p) => EventKind::Packet(p.kind()),
            Event::Channel(_) => EventKind::Channel,
            Event::UserJoined { .. } => EventKind::UserJoined,
            Event::UserUpdate(_) => EventKind::UserUpdate,
            Event::UserLeft(_) => EventKind::UserLeft,
            Event::Chat(_) => EventKind::Chat,
            Event::Whisper(_) => EventKind::Whisper,
            Event::JoinError { .. } => EventKind::JoinError,
            Event::SystemMessage { .. } => EventKind::SystemMessage,
            Event::AsyncError(_) => EventKind::AsyncError,
            Event::Disconnected => EventKind::Disconnected,
        }
    }
}

impl From<PacketKind> for EventKind {
    fn from(kind: PacketKind) -> Self {
        EventKind::Packet(kind)
    }
}
