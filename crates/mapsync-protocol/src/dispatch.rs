//! Dispatch envelopes: the only message shape on the wire.
//!
//! Every frame is one JSON object `{"id", "function", "data"}`. Two
//! representations exist:
//!
//! - [`Dispatch<T>`]: typed, payload already decoded.
//! - [`RawDispatch`]: envelope decoded, payload still raw JSON.
//!
//! Decoding is two-phase. Phase one reads the envelope into a
//! [`RawDispatch`], which is enough to learn the [`Function`] tag. Phase two
//! decodes the payload into the type that tag implies, producing a
//! [`Message`].
//!
//! ```text
//! bytes ──from_bytes──→ RawDispatch ──Message::decode──→ Message
//!                           ↑
//! Dispatch<T> ──marshal─────┘ ──to_bytes──→ bytes
//! ```

use std::future::Future;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::{CharacterAsset, ChatMessage, Credentials, Player, ProtocolError};

/// Every operation the protocol knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Function {
    Authenticate,
    UpdatePlayer,
    RemoveOnlinePlayer,
    LoadNewOnlinePlayer,
    LoadOnlinePlayers,
    Chat,
}

impl Function {
    /// The wire name, e.g. `"update_player"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authenticate => "authenticate",
            Self::UpdatePlayer => "update_player",
            Self::RemoveOnlinePlayer => "remove_online_player",
            Self::LoadNewOnlinePlayer => "load_new_online_player",
            Self::LoadOnlinePlayers => "load_online_players",
            Self::Chat => "chat",
        }
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything that can accept a serialized envelope for delivery.
///
/// Implemented by the server's connection type. Returns `false` when the
/// frame was not enqueued (garbage bytes, connection gone, superseded).
pub trait Publisher: Send + Sync {
    fn publish(&self, frame: Vec<u8>) -> impl Future<Output = bool> + Send;
}

// ---------------------------------------------------------------------------
// Typed envelope
// ---------------------------------------------------------------------------

/// An envelope whose payload is already a Rust value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispatch<T> {
    pub id: String,
    pub function: Function,
    pub data: T,
}

impl<T: Serialize> Dispatch<T> {
    pub fn new(id: impl Into<String>, function: Function, data: T) -> Self {
        Self {
            id: id.into(),
            function,
            data,
        }
    }

    /// A server-originated envelope with a fresh correlation id.
    pub fn server(function: Function, data: T) -> Self {
        Self::new(new_dispatch_id(), function, data)
    }

    /// Serializes the payload, keeping id and function.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the payload can't be serialized.
    pub fn marshal(&self) -> Result<RawDispatch, ProtocolError> {
        let data = serde_json::value::to_raw_value(&self.data)
            .map_err(ProtocolError::Encode)?;
        Ok(RawDispatch {
            id: self.id.clone(),
            function: self.function,
            data,
        })
    }

    /// Encodes the whole envelope to frame bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(ProtocolError::Encode)
    }

    /// Marshals and hands the frame to `target`.
    ///
    /// A missing target or an encode failure is a no-op that returns
    /// `false`; delivery is best effort.
    pub async fn publish<P: Publisher>(&self, target: Option<&P>) -> bool {
        let Some(target) = target else {
            tracing::debug!(id = %self.id, function = %self.function, "no target, dispatch dropped");
            return false;
        };
        match self.to_bytes() {
            Ok(frame) => target.publish(frame).await,
            Err(e) => {
                tracing::warn!(id = %self.id, function = %self.function, error = %e, "dispatch encode failed");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Raw envelope
// ---------------------------------------------------------------------------

/// An envelope whose payload is still unparsed JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDispatch {
    #[serde(default)]
    pub id: String,
    pub function: Function,
    pub data: Box<RawValue>,
}

impl RawDispatch {
    /// Phase one: reads the envelope from frame bytes.
    ///
    /// # Errors
    /// [`ProtocolError::Decode`] on malformed JSON, a missing field, or an
    /// unknown function name.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(ProtocolError::Encode)
    }

    /// Decodes the payload as `T`, keeping id and function.
    ///
    /// # Errors
    /// [`ProtocolError::Decode`] if the payload doesn't have `T`'s shape.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<Dispatch<T>, ProtocolError> {
        let data = serde_json::from_str(self.data.get()).map_err(ProtocolError::Decode)?;
        Ok(Dispatch {
            id: self.id.clone(),
            function: self.function,
            data,
        })
    }
}

// ---------------------------------------------------------------------------
// Tagged union
// ---------------------------------------------------------------------------

/// A fully decoded client message, one variant per [`Function`].
///
/// `LoadNewOnlinePlayer` carries a [`Player`] here because that is what
/// clients send; the server's outbound form carries character assets.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Authenticate(Credentials),
    UpdatePlayer(Player),
    RemoveOnlinePlayer(String),
    LoadNewOnlinePlayer(Player),
    LoadOnlinePlayers(Vec<CharacterAsset>),
    Chat(ChatMessage),
}

impl Message {
    /// Phase two: decodes the payload according to the function tag.
    pub fn decode(raw: &RawDispatch) -> Result<Self, ProtocolError> {
        let data = raw.data.get();
        let decode_err = ProtocolError::Decode;
        Ok(match raw.function {
            Function::Authenticate => {
                Self::Authenticate(serde_json::from_str(data).map_err(decode_err)?)
            }
            Function::UpdatePlayer => {
                Self::UpdatePlayer(serde_json::from_str(data).map_err(decode_err)?)
            }
            Function::RemoveOnlinePlayer => {
                Self::RemoveOnlinePlayer(serde_json::from_str(data).map_err(decode_err)?)
            }
            Function::LoadNewOnlinePlayer => {
                Self::LoadNewOnlinePlayer(serde_json::from_str(data).map_err(decode_err)?)
            }
            Function::LoadOnlinePlayers => {
                Self::LoadOnlinePlayers(serde_json::from_str(data).map_err(decode_err)?)
            }
            Function::Chat => Self::Chat(serde_json::from_str(data).map_err(decode_err)?),
        })
    }

    /// Both phases at once.
    pub fn from_bytes(bytes: &[u8]) -> Result<(String, Self), ProtocolError> {
        let raw = RawDispatch::from_bytes(bytes)?;
        let msg = Self::decode(&raw)?;
        Ok((raw.id, msg))
    }

    pub fn function(&self) -> Function {
        match self {
            Self::Authenticate(_) => Function::Authenticate,
            Self::UpdatePlayer(_) => Function::UpdatePlayer,
            Self::RemoveOnlinePlayer(_) => Function::RemoveOnlinePlayer,
            Self::LoadNewOnlinePlayer(_) => Function::LoadNewOnlinePlayer,
            Self::LoadOnlinePlayers(_) => Function::LoadOnlinePlayers,
            Self::Chat(_) => Function::Chat,
        }
    }
}

/// Generates a random 32-character hex correlation id (128 bits).
pub fn new_dispatch_id() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
