//! Transport abstraction layer for mapsync.
//!
//! Provides the [`Transport`] and [`Channel`] traits. A channel is the
//! persistent bidirectional link between one client and the server; the
//! layers above only ever see whole frames of bytes plus a liveness check
//! (ping out, pong timestamp in).
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{DEFAULT_HANDSHAKE_TIMEOUT, WebSocketChannel, WebSocketTransport};

use std::fmt;
use std::future::Future;

use tokio::time::Instant;

/// Opaque identifier for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Creates a new `ChannelId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan-{}", self.0)
    }
}

/// Accepts new incoming channels.
pub trait Transport: Send + Sync + 'static {
    /// The channel type produced by this transport.
    type Channel: Channel;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and upgrades the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Channel, Self::Error>> + Send;
}

/// A single persistent channel that carries whole frames.
///
/// The futures are `Send` so that generic code can drive a channel from
/// spawned tasks. Implementors may still write `async fn` in their impls.
pub trait Channel: Send + Sync + 'static {
    /// The error type for channel operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends one frame to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next data frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the channel is cleanly closed. Control frames
    /// are consumed internally; a pong refreshes [`last_pong`](Self::last_pong).
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Writes a protocol-level ping frame.
    fn ping(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// When the last pong arrived (or when the channel opened, if none has).
    fn last_pong(&self) -> Instant;

    /// Closes the channel.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the unique identifier for this channel.
    fn id(&self) -> ChannelId;
}
