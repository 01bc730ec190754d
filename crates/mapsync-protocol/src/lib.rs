//! Wire protocol for mapsync.
//!
//! This crate defines what clients and the server say to each other:
//!
//! - **Envelopes** ([`Dispatch`], [`RawDispatch`], [`Message`]): the
//!   `{id, function, data}` frame and its two-phase decode.
//! - **Records** ([`Player`], [`ChatMessage`], [`Credentials`],
//!   [`CharacterAsset`]): the payloads those envelopes carry.
//! - **Codec** ([`Codec`], [`JsonCodec`]): bytes in, values out.
//!
//! It knows nothing about connections or registries.
//!
//! ```text
//! Transport (bytes) → Protocol (Message) → Router (registries + fan-out)
//! ```

mod codec;
mod dispatch;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use dispatch::{Dispatch, Function, Message, Publisher, RawDispatch, new_dispatch_id};
pub use error::ProtocolError;
pub use types::{
    AssetType, CharacterAsset, ChatMessage, Credentials, Direction, Pixel, PixelData, Player,
    Position,
};
