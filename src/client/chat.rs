//! Channel membership tracking.
//!
//! [`ChatRoom`] folds server chat events into the current channel and its
//! roster, and says which higher-level [`Event`] each one produces. It holds
//! no lock and does no I/O; the client wraps it in a mutex and fires the
//! returned event after releasing it.

use crate::core::payloads::{ChatEvent, ChatEventType};
use crate::protocol::event::{Channel, Chat, Event, User, Whisper};
use std::collections::HashMap;
use std::time::SystemTime;
use unicode_general_category::{get_general_category, GeneralCategory};

/// Longest chat line the server relays.
pub const MAX_CHAT_LEN: usize = 254;

/// Longest emoji sequence tried, in chars (ZWJ sequences with skin tones).
const MAX_EMOJI_CHARS: usize = 12;

/// Replace emoji with their `:shortcode:` text.
///
/// Matches the longest known sequence at each position. Emoji without a
/// shortcode are left as they are.
pub fn emoji_to_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    'scan: while let Some(c) = rest.chars().next() {
        if !c.is_ascii() {
            let ends: Vec<usize> = rest
                .char_indices()
                .take(MAX_EMOJI_CHARS)
                .map(|(i, c)| i + c.len_utf8())
                .collect();
            for &end in ends.iter().rev() {
                if let Some(code) = emojis::get(&rest[..end]).and_then(|e| e.shortcode()) {
                    out.push(':');
                    out.push_str(code);
                    out.push(':');
                    rest = &rest[end..];
                    continue 'scan;
                }
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Letters, marks, numbers, punctuation, symbols and the ASCII space.
pub fn is_printable(c: char) -> bool {
    use GeneralCategory::*;
    match get_general_category(c) {
        Control | Format | PrivateUse | Surrogate | Unassigned | LineSeparator
        | ParagraphSeparator => false,
        SpaceSeparator => c == ' ',
        _ => true,
    }
}

/// Spell out emoji, drop non-printable characters and cut to
/// [`MAX_CHAT_LEN`] bytes without splitting a character.
pub fn filter_chat(text: &str) -> String {
    let text = emoji_to_text(text);
    let mut out = String::with_capacity(text.len().min(MAX_CHAT_LEN));
    for c in text.chars().filter(|c| is_printable(*c)) {
        if out.len() + c.len_utf8() > MAX_CHAT_LEN {
            break;
        }
        out.push(c);
    }
    out
}

fn key(name: &str) -> String {
    name.to_lowercase()
}

#[derive(Debug, Clone, Default)]
pub struct ChatRoom {
    channel: String,
    users: HashMap<String, User>,
}

impl ChatRoom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Case-insensitive lookup.
    pub fn user(&self, name: &str) -> Option<&User> {
        self.users.get(&key(name))
    }

    /// Roster keyed by lower-cased name.
    pub fn users(&self) -> &HashMap<String, User> {
        &self.users
    }

    pub fn clear(&mut self) {
        self.channel.clear();
        self.users.clear();
    }

    /// Update membership from one chat event.
    pub fn apply(&mut self, ev: &ChatEvent, now: SystemTime) -> Option<Event> {
        match ev.event_type {
            ChatEventType::ChannelInfo => {
                self.channel = ev.text.clone();
                self.users.clear();
                Some(Event::Channel(Channel {
                    name: ev.text.clone(),
                    flags: ev.channel_flags,
                }))
            }
            ChatEventType::ShowUser | ChatEventType::Join => {
                let mut user = User {
                    name: ev.username.clone(),
                    stat_string: ev.text.clone(),
                    flags: ev.user_flags,
                    ping: ev.ping,
                    joined: now,
                    last_seen: now,
                };
                let k = key(&ev.username);
                let known = match self.users.get(&k) {
                    Some(prev) => {
                        user.joined = prev.joined;
                        user.last_seen = prev.last_seen;
                        true
                    }
                    None => false,
                };
                self.users.insert(k, user.clone());
                if known {
                    Some(Event::UserUpdate(user))
                } else {
                    Some(Event::UserJoined {
                        user,
                        already_in_channel: ev.event_type == ChatEventType::ShowUser,
                    })
                }
            }
            ChatEventType::UserFlagsUpdate => {
                let user = self.users.get_mut(&key(&ev.username))?;
                user.flags = ev.user_flags;
                Some(Event::UserUpdate(user.clone()))
            }
            ChatEventType::Leave => self.users.remove(&key(&ev.username)).map(Event::UserLeft),
            ChatEventType::Talk | ChatEventType::Emote => {
                let user = match self.users.get_mut(&key(&ev.username)) {
                    Some(user) => {
                        user.last_seen = now;
                        user.clone()
                    }
                    // Not on the roster, e.g. talking before the listing finished.
                    None => User {
                        name: ev.username.clone(),
                        stat_string: String::new(),
                        flags: ev.user_flags,
                        ping: ev.ping,
                        joined: now,
                        last_seen: now,
                    },
                };
                Some(Event::Chat(Chat {
                    user,
                    content: ev.text.clone(),
                    kind: ev.event_type,
                }))
            }
            ChatEventType::Whisper => Some(Event::Whisper(Whisper {
                username: ev.username.clone(),
                content: ev.text.clone(),
                flags: ev.user_flags,
                ping: ev.ping,
            })),
            ChatEventType::ChannelFull
            | ChatEventType::ChannelDoesNotExist
            | ChatEventType::ChannelRestricted => Some(Event::JoinError {
                channel: ev.text.clone(),
                error: ev.event_type,
            }),
            ChatEventType::Broadcast | ChatEventType::Info | ChatEventType::Error => {
                Some(Event::SystemMessage {
                    content: ev.text.clone(),
                    kind: ev.event_type,
                })
            }
            ChatEventType::WhisperSent | ChatEventType::Other(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(event_type: ChatEventType, username: &str, text: &str) -> ChatEvent {
        ChatEvent {
            event_type,
            user_flags: 0,
            channel_flags: 0,
            ping: 32,
            username: username.into(),
            text: text.into(),
        }
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn names(room: &ChatRoom) -> Vec<String> {
        let mut names: Vec<_> = room.users().values().map(|u| u.name.clone()).collect();
        names.sort();
        names
    }

    #[test]
    fn test_channel_info_replay_resets_roster() {
        let mut room = ChatRoom::new();
        room.apply(&event(ChatEventType::Join, "Stale", "PX3W"), at(1));

        for round in 0..2 {
            let info = room.apply(&event(ChatEventType::ChannelInfo, "me", "W3"), at(10 + round));
            assert!(matches!(info, Some(Event::Channel(c)) if c.name == "W3"));
            room.apply(&event(ChatEventType::ShowUser, "Alice", "PX3W"), at(10 + round));
            room.apply(&event(ChatEventType::ShowUser, "Bob", "3RAW"), at(10 + round));
            assert_eq!(names(&room), ["Alice", "Bob"]);
        }
        assert_eq!(room.channel(), "W3");
        assert!(room.user("stale").is_none());
    }

    #[test]
    fn test_join_then_update_keeps_joined() {
        let mut room = ChatRoom::new();
        let first = room.apply(&event(ChatEventType::ShowUser, "Alice", "PX3W"), at(1));
        assert!(matches!(
            first,
            Some(Event::UserJoined { user, already_in_channel: true }) if user.joined == at(1)
        ));

        let mut again = event(ChatEventType::ShowUser, "ALICE", "PX3W 1 0");
        again.user_flags = 0x02;
        match room.apply(&again, at(9)) {
            Some(Event::UserUpdate(user)) => {
                assert_eq!(user.joined, at(1));
                assert_eq!(user.flags, 0x02);
                assert_eq!(user.stat_string, "PX3W 1 0");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(room.users().len(), 1);
    }
    #[test]
    fn test_filter_chat() {
        assert_eq!(filter_chat("hi\tthere\n"), "hithere");
        assert_eq!(filter_chat(&"a".repeat(300)).len(), MAX_CHAT_LEN);

        // 127 two-byte characters fill 254 bytes exactly; one more is dropped.
        let long = "é".repeat(128);
        let filtered = filter_chat(&long);
        assert_eq!(filtered.len(), 254);
        assert_eq!(filtered.chars().count(), 127);

        let mixed = format!("{}€", "a".repeat(252));
        assert_eq!(filter_chat(&mixed), "a".repeat(252));
    }

    #[test]
    fn test_filter_chat_strips_invisible_characters() {
        assert_eq!(filter_chat("a\u{200B}\u{202E}\u{2028}\u{FEFF}b"), "ab");
        assert_eq!(filter_chat("a\u{2029}\u{E000}\u{0378}b"), "ab");
        // Only the ASCII space survives among separators.
        assert_eq!(filter_chat("a\u{00A0}b\u{3000}c d"), "abc d");
        assert_eq!(filter_chat("caf\u{0065}\u{0301}"), "caf\u{0065}\u{0301}");
    }

    #[test]
    fn test_emoji_spelled_out() {
        assert_eq!(emoji_to_text("hi \u{1F600}"), "hi :grinning:");
        assert_eq!(filter_chat("gg \u{1F600}\u{1F600}"), "gg :grinning::grinning:");
        assert_eq!(emoji_to_text("no emoji, caf\u{00E9}"), "no emoji, caf\u{00E9}");

        // Spelled-out text counts against the length limit.
        let long = format!("{}\u{1F600}", "a".repeat(250));
        assert_eq!(filter_chat(&long), format!("{}:gri", "a".repeat(250)));
    }

    #[test]
    fn test_flags_update_unknown_user_is_silent() {
        let mut room = ChatRoom::new();
        let ev = event(ChatEventType::UserFlagsUpdate, "ghost", "");
        assert_eq!(room.apply(&ev, at(1)), None);
        assert!(room.users().is_empty());
    }

    #[test]
    fn test_leave_fires_once() {
        let mut room = ChatRoom::new();
        room.apply(&event(ChatEventType::Join, "Grubby", "3RAW"), at(1));
        let left = room.apply(&event(ChatEventType::Leave, "grubby", ""), at(2));
        assert!(matches!(left, Some(Event::UserLeft(u)) if u.name == "Grubby"));
        assert_eq!(room.apply(&event(ChatEventType::Leave, "grubby", ""), at(3)), None);
    }

    #[test]
    fn test_talk_updates_last_seen() {
        let mut room = ChatRoom::new();
        room.apply(&event(ChatEventType::ShowUser, "Moon", "3RAW"), at(1));
        let chat = room.apply(&event(ChatEventType::Talk, "moon", "gg"), at(5));
        match chat {
            Some(Event::Chat(c)) => {
                assert_eq!(c.user.joined, at(1));
                assert_eq!(c.user.last_seen, at(5));
                assert_eq!(c.user.stat_string, "3RAW");
                assert_eq!(c.content, "gg");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(room.user("MOON").map(|u| u.last_seen), Some(at(5)));
    }

    #[test]
    fn test_talk_from_unlisted_user() {
        let mut room = ChatRoom::new();
        let chat = room.apply(&event(ChatEventType::Emote, "Sky", "waves"), at(2));
        assert!(matches!(chat, Some(Event::Chat(c)) if c.user.name == "Sky" && c.kind == ChatEventType::Emote));
        assert!(room.user("sky").is_none());
    }

    #[test]
    fn test_text_events_forwarded() {
        let mut room = ChatRoom::new();
        assert_eq!(
            room.apply(&event(ChatEventType::ChannelFull, "", "Clan TeD"), at(1)),
            Some(Event::JoinError {
                channel: "Clan TeD".into(),
                error: ChatEventType::ChannelFull,
            })
        );
        assert_eq!(
            room.apply(&event(ChatEventType::Broadcast, "", "maintenance"), at(1)),
            Some(Event::SystemMessage {
                content: "maintenance".into(),
                kind: ChatEventType::Broadcast,
            })
        );
        assert!(matches!(
            room.apply(&event(ChatEventType::Whisper, "Lyn", "hey"), at(1)),
            Some(Event::Whisper(w)) if w.username == "Lyn" && w.content == "hey"
        ));
        assert_eq!(room.apply(&event(ChatEventType::Other(0x42), "", ""), at(1)), None);
    }
}
