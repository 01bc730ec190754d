//! Codec trait and the JSON implementation.
//!
//! A codec converts between Rust values and raw frame bytes. Everything on
//! the wire today is JSON, so [`JsonCodec`] is the only implementation, but
//! the connection layer only depends on the [`Codec`] trait.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because one codec is shared by every connection
/// task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T)
    -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;

    /// Returns `true` if `data` is one well-formed serialized value.
    ///
    /// Used to refuse garbage before it reaches a client's mailbox.
    fn is_well_formed(&self, data: &[u8]) -> bool {
        self.decode::<serde::de::IgnoredAny>(data).is_ok()
    }
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use mapsync_protocol::{Codec, Dispatch, Function, JsonCodec};
///
/// let codec = JsonCodec;
/// let dispatch = Dispatch::new("123", Function::RemoveOnlinePlayer, "alice".to_string());
///
/// let bytes = codec.encode(&dispatch).unwrap();
/// assert_eq!(
///     bytes,
///     br#"{"id":"123","function":"remove_online_player","data":"alice"}"#
/// );
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
