//! # mapsync
//!
//! Real-time map synchronization for browser multiplayer games.
//!
//! mapsync keeps every connected client's view of "who else is on this map,
//! where are they, and what are they saying" consistent. Clients open a
//! world channel (`/ws/<user>`) and optionally a chat channel
//! (`/ws/chat::<user>`), authenticate with the shared client secret, and
//! from then on exchange `{id, function, data}` envelopes.
//!
//! ## Layers
//!
//! ```text
//! mapsync-transport   WebSocket channels, ping/pong
//! mapsync-protocol    envelopes, records, two-phase decode
//! mapsync-session     identity, authentication, connection registries
//! mapsync-world       player registry, membership state machine
//! mapsync-heartbeat   ping cadence, liveness
//! mapsync (this)      Hub, Connection, router, asset store, server
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mapsync::prelude::*;
//!
//! # async fn run() -> Result<(), MapsyncError> {
//! let server = MapsyncServerBuilder::new()
//!     .bind("127.0.0.1:9191")
//!     .credentials(ClientCredentials::new("game", "s3cret"))
//!     .build(MemoryAssetStore::new())
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod connection;
mod error;
mod hub;
pub mod router;
mod server;
mod store;

pub use config::MailboxConfig;
pub use connection::Connection;
pub use error::MapsyncError;
pub use hub::Hub;
pub use server::{MapsyncServer, MapsyncServerBuilder, identity_from_path};
pub use store::{AssetStore, MemoryAssetStore, StoreError};

pub mod prelude {
    pub use crate::{
        AssetStore, Connection, Hub, MailboxConfig, MapsyncError, MapsyncServer,
        MapsyncServerBuilder, MemoryAssetStore, StoreError,
    };
    pub use mapsync_heartbeat::HeartbeatConfig;
    pub use mapsync_protocol::{
        AssetType, CharacterAsset, ChatMessage, Credentials, Direction, Dispatch, Function,
        Message, Pixel, Player, Position, RawDispatch,
    };
    pub use mapsync_session::{
        Authenticator, ChannelKind, ClientCredentials, Identity, SessionError,
    };
    pub use mapsync_transport::{Channel, ChannelId, TransportError};
}
