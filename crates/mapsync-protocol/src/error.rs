//! Error types for the protocol layer.
//!
//! Each crate in mapsync defines its own error enum. A `ProtocolError`
//! always means a problem turning envelopes into bytes or back, never a
//! networking or registry problem.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, or a payload
    /// whose shape doesn't match its `function` tag.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A facing direction outside `0..=3`.
    #[error("invalid direction {0}, expected 0-3")]
    InvalidDirection(u8),
}
