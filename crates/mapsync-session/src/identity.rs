//! Connection identities and which registry they belong to.
//!
//! The identity is the opaque string a client supplies at upgrade time.
//! `chat::<user>` opens the user's chat channel; anything else is a world
//! channel keyed by the whole identity string.

use std::fmt;

use crate::SessionError;

const CHAT_PREFIX: &str = "chat::";

/// Which connection registry a channel lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    World,
    Chat,
}

/// A parsed connection identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    raw: String,
    kind: ChannelKind,
    key: String,
}

impl Identity {
    /// Classifies `raw`.
    ///
    /// # Errors
    /// [`SessionError::InvalidIdentity`] for an empty string or a bare
    /// `chat::` prefix.
    pub fn parse(raw: impl Into<String>) -> Result<Self, SessionError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(SessionError::InvalidIdentity(raw));
        }

        let (kind, key) = match raw.strip_prefix(CHAT_PREFIX) {
            Some("") => return Err(SessionError::InvalidIdentity(raw)),
            Some(user) => (ChannelKind::Chat, user.to_owned()),
            None => (ChannelKind::World, raw.clone()),
        };
        Ok(Self { raw, kind, key })
    }

    /// The identity exactly as the client sent it.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// The registry key: the user id for chat, the full identity for world.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_chat(&self) -> bool {
        self.kind == ChannelKind::Chat
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
