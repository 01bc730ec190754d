//! Domain records carried inside dispatch payloads.
//!
//! These are plain data. Every field name here is part of the wire format
//! and is pinned with `serde` attributes where the Rust name differs.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Direction / Position / Player
// ---------------------------------------------------------------------------

/// Facing direction of a player. Encoded on the wire as an integer `0..=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Direction {
    #[default]
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl TryFrom<u8> for Direction {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Up),
            1 => Ok(Self::Down),
            2 => Ok(Self::Left),
            3 => Ok(Self::Right),
            other => Err(ProtocolError::InvalidDirection(other)),
        }
    }
}

impl From<Direction> for u8 {
    fn from(dir: Direction) -> Self {
        dir as u8
    }
}

/// Integer grid coordinates within a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// A player's placement: which map they are on, where, and facing which way.
///
/// `map_id` is the map the player is on (or is entering). An empty
/// `map_id` means the client has not placed the player anywhere yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub user_id: String,
    pub map_id: String,
    #[serde(default)]
    pub dir: Direction,
    #[serde(default)]
    pub pos: Position,
}

impl Player {
    pub fn new(user_id: impl Into<String>, map_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            map_id: map_id.into(),
            dir: Direction::default(),
            pos: Position::default(),
        }
    }

    /// Builder-style setter for the position.
    pub fn at(mut self, pos: Position) -> Self {
        self.pos = pos;
        self
    }

    /// Builder-style setter for the facing direction.
    pub fn facing(mut self, dir: Direction) -> Self {
        self.dir = dir;
        self
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A chat line. The server truncates `message` before fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub user_id: String,
    #[serde(rename = "username")]
    pub user_name: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Client credentials as sent in an `authenticate` payload.
///
/// The payload is a header-style map of names to value lists, e.g.
/// `{"CLIENT_ID":["game"],"CLIENT_SECRET":["s3cret"]}`. Only the first
/// value under each name is ever consulted.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(HashMap<String, Vec<String>>);

impl Credentials {
    /// Header name carrying the client id.
    pub const CLIENT_ID: &'static str = "CLIENT_ID";
    /// Header name carrying the client secret.
    pub const CLIENT_SECRET: &'static str = "CLIENT_SECRET";

    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        let mut headers = HashMap::with_capacity(2);
        headers.insert(Self::CLIENT_ID.to_owned(), vec![client_id.into()]);
        headers.insert(Self::CLIENT_SECRET.to_owned(), vec![client_secret.into()]);
        Self(headers)
    }

    /// First value under `name`, if any.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.first(Self::CLIENT_ID)
    }

    pub fn client_secret(&self) -> Option<&str> {
        self.first(Self::CLIENT_SECRET)
    }
}

// Never print the secret, even at trace level.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id())
            .field("client_secret", &self.client_secret().map(|_| "<redacted>"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Character assets
// ---------------------------------------------------------------------------

/// What a stored asset depicts.
///
/// Only the four `player_*` kinds are character assets; the rest belong
/// to maps and are never sent by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Tile,
    Object,
    Portal,
    PlayerUp,
    PlayerDown,
    PlayerLeft,
    PlayerRight,
}

impl AssetType {
    /// `true` for the directional character sprites.
    pub fn is_character(self) -> bool {
        matches!(
            self,
            Self::PlayerUp | Self::PlayerDown | Self::PlayerLeft | Self::PlayerRight
        )
    }
}

/// One pixel of a sprite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pixel {
    pub x: i32,
    pub y: i32,
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
    pub color: String,
}

/// Rows of pixels, outer index is `y`.
pub type PixelData = Vec<Vec<Pixel>>;

/// A user's character sprite as returned by the asset store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterAsset {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub name: String,
    pub asset_type: AssetType,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub data: PixelData,
}
