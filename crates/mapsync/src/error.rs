//! Unified error type for mapsync.

use mapsync_protocol::ProtocolError;
use mapsync_session::SessionError;
use mapsync_transport::TransportError;

use crate::store::StoreError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each layer's variant lets `?` convert
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum MapsyncError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth, identity, lookup).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The asset store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// `close` was called on a connection whose channel is already gone.
    #[error("cannot close nil connection {0}")]
    NilConnection(String),
}
