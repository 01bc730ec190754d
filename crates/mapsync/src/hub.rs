//! Shared services every connection and the router reach through.
//!
//! A [`Hub`] is built once per server and handed to each [`Connection`] as
//! an `Arc`. Nothing in mapsync is global: two hubs in one process are two
//! independent worlds, which is how the tests run servers side by side.

use mapsync_heartbeat::HeartbeatConfig;
use mapsync_protocol::JsonCodec;
use mapsync_session::{ChannelKind, ClientCredentials, ConnectionRegistry};
use mapsync_world::PlayerRegistry;

use crate::config::MailboxConfig;
use crate::connection::Connection;

/// The registries, collaborators, and settings shared by all connections.
///
/// - `T`: the channel type connections run on
/// - `S`: the asset store
/// - `A`: the authenticator (defaults to the shared client secret)
pub struct Hub<T, S, A = ClientCredentials> {
    world: ConnectionRegistry<Connection<T, S, A>>,
    chat: ConnectionRegistry<Connection<T, S, A>>,
    players: PlayerRegistry,
    store: S,
    auth: A,
    codec: JsonCodec,
    heartbeat: HeartbeatConfig,
    mailbox: MailboxConfig,
}

impl<T, S, A> Hub<T, S, A> {
    /// Creates a hub with default heartbeat and mailbox settings.
    pub fn new(store: S, auth: A) -> Self {
        Self {
            world: ConnectionRegistry::new(),
            chat: ConnectionRegistry::new(),
            players: PlayerRegistry::new(),
            store,
            auth,
            codec: JsonCodec,
            heartbeat: HeartbeatConfig::default(),
            mailbox: MailboxConfig::default(),
        }
    }

    pub fn with_heartbeat(mut self, config: HeartbeatConfig) -> Self {
        self.heartbeat = config.validated();
        self
    }

    pub fn with_mailbox(mut self, config: MailboxConfig) -> Self {
        self.mailbox = config.validated();
        self
    }

    /// The registry for one channel kind.
    pub fn connections(&self, kind: ChannelKind) -> &ConnectionRegistry<Connection<T, S, A>> {
        match kind {
            ChannelKind::World => &self.world,
            ChannelKind::Chat => &self.chat,
        }
    }

    /// World channels, keyed by user id.
    pub fn world(&self) -> &ConnectionRegistry<Connection<T, S, A>> {
        &self.world
    }

    /// Chat channels, keyed by user id.
    pub fn chat(&self) -> &ConnectionRegistry<Connection<T, S, A>> {
        &self.chat
    }

    pub fn players(&self) -> &PlayerRegistry {
        &self.players
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn auth(&self) -> &A {
        &self.auth
    }

    pub fn codec(&self) -> &JsonCodec {
        &self.codec
    }

    pub fn heartbeat(&self) -> &HeartbeatConfig {
        &self.heartbeat
    }

    pub fn mailbox(&self) -> &MailboxConfig {
        &self.mailbox
    }
}
