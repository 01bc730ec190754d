//! One client's persistent connection.
//!
//! A [`Connection`] owns its channel and runs three cooperating tasks once
//! [`listen`](Connection::listen) is called:
//!
//! ```text
//!             ┌──────────── stop_heartbeat ────────────┐
//!  heartbeat ─┤ ping every interval, evict on silence  ├─→ close()
//!             └────────────────────────────────────────┘
//!             ┌────────────── stop_listen ─────────────┐
//!  inbound  ──┤ authenticate first frame, then route   ├─→ close()
//!  outbound ──┤ drain mailbox onto the channel (FIFO)  ├─→ close()
//!             └────────────────────────────────────────┘
//! ```
//!
//! Whichever task ends first calls [`close`](Connection::close). Close takes
//! the channel out of the connection, so the later callers get
//! [`MapsyncError::NilConnection`] and return quietly.
//!
//! Other connections talk to this one only through
//! [`publish`](Connection::publish), which enqueues serialized frames on the
//! bounded mailbox.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mapsync_heartbeat::{Heartbeat, Liveness};
use mapsync_protocol::{Codec, Dispatch, Message, Publisher, RawDispatch};
use mapsync_session::{Authenticator, ChannelKind, ClientCredentials, Identity, SessionError};
use mapsync_transport::{Channel, ChannelId};
use mapsync_world::Membership;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::MapsyncError;
use crate::hub::Hub;
use crate::router;
use crate::store::AssetStore;

fn lock<X>(mutex: &Mutex<X>) -> MutexGuard<'_, X> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A live client connection and its lifecycle state.
pub struct Connection<T, S, A = ClientCredentials> {
    identity: Identity,
    channel_id: ChannelId,
    /// `None` once closed.
    channel: Mutex<Option<Arc<T>>>,
    /// Write-once: flips to `true` and never back.
    authenticated: AtomicBool,
    /// The map the router last placed this connection's player on.
    map_id: Mutex<Option<String>>,
    /// When the last ping was successfully written.
    last_heartbeat: Mutex<Instant>,
    mailbox: mpsc::Sender<Vec<u8>>,
    /// Taken by the outbound task.
    outbox: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    stop_heartbeat: CancellationToken,
    stop_listen: CancellationToken,
    hub: Arc<Hub<T, S, A>>,
}

impl<T, S, A> Connection<T, S, A>
where
    T: Channel,
    S: AssetStore,
    A: Authenticator,
{
    /// Wraps an upgraded channel. The connection joins its registry only
    /// once it has authenticated.
    pub fn new(hub: Arc<Hub<T, S, A>>, identity: Identity, channel: T) -> Arc<Self> {
        let (mailbox, outbox) = mpsc::channel(hub.mailbox().capacity);
        let channel_id = channel.id();

        let conn = Arc::new(Self {
            identity,
            channel_id,
            channel: Mutex::new(Some(Arc::new(channel))),
            authenticated: AtomicBool::new(false),
            map_id: Mutex::new(None),
            last_heartbeat: Mutex::new(Instant::now()),
            mailbox,
            outbox: Mutex::new(Some(outbox)),
            stop_heartbeat: CancellationToken::new(),
            stop_listen: CancellationToken::new(),
            hub,
        });

        info!(identity = %conn.identity, channel = %channel_id, "connection opened");
        conn
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn hub(&self) -> &Hub<T, S, A> {
        &self.hub
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    /// `false` once the connection has been closed.
    pub fn is_open(&self) -> bool {
        lock(&self.channel).is_some()
    }

    /// The map id recorded for this connection, if placed.
    pub fn map_id(&self) -> Option<String> {
        lock(&self.map_id).clone()
    }

    pub fn set_map_id(&self, map_id: Option<String>) {
        *lock(&self.map_id) = map_id;
    }

    pub fn membership(&self) -> Membership {
        Membership::from_recorded(lock(&self.map_id).as_deref())
    }

    pub fn last_heartbeat(&self) -> Instant {
        *lock(&self.last_heartbeat)
    }

    fn channel(&self) -> Option<Arc<T>> {
        lock(&self.channel).clone()
    }

    fn is_current(&self) -> bool {
        self.hub
            .connections(self.identity.kind())
            .is_current(self.identity.key(), self)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Runs the heartbeat, inbound, and outbound tasks until the
    /// connection closes.
    ///
    /// Heartbeat and inbound are spawned; outbound runs on the caller's
    /// task. Returns once all three have finished.
    pub async fn listen(self: Arc<Self>) {
        let heartbeat = tokio::spawn(Arc::clone(&self).heartbeat_loop());
        let inbound = tokio::spawn(Arc::clone(&self).inbound_loop());

        Arc::clone(&self).outbound_loop().await;

        let _ = heartbeat.await;
        let _ = inbound.await;
        debug!(identity = %self.identity, "connection tasks finished");
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut heartbeat = Heartbeat::new(self.hub.heartbeat().clone());

        loop {
            tokio::select! {
                _ = self.stop_heartbeat.cancelled() => break,
                _ = heartbeat.wait_for_beat() => {}
            }

            let Some(channel) = self.channel() else { break };
            if let Liveness::Expired { silent_for } = heartbeat.liveness(channel.last_pong()) {
                warn!(
                    identity = %self.identity,
                    silent_ms = silent_for.as_millis() as u64,
                    "no pong within timeout, evicting"
                );
                break;
            }
            if let Err(e) = channel.ping().await {
                debug!(identity = %self.identity, error = %e, "ping failed");
                break;
            }
            *lock(&self.last_heartbeat) = Instant::now();
        }

        self.shutdown("heartbeat").await;
    }

    async fn inbound_loop(self: Arc<Self>) {
        loop {
            let Some(channel) = self.channel() else { break };
            let received = tokio::select! {
                _ = self.stop_listen.cancelled() => break,
                received = channel.recv() => received,
            };

            let frame = match received {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!(identity = %self.identity, "peer closed channel");
                    break;
                }
                Err(e) => {
                    debug!(identity = %self.identity, error = %e, "read failed");
                    break;
                }
            };

            if !self.is_authenticated() {
                match self.authenticate(&frame).await {
                    Ok(()) => continue,
                    Err(e) => {
                        warn!(identity = %self.identity, error = %e, "authentication failed");
                        break;
                    }
                }
            }

            match RawDispatch::from_bytes(&frame) {
                Ok(raw) => router::route(&self, raw).await,
                Err(e) => {
                    debug!(identity = %self.identity, error = %e, "dropping undecodable frame");
                }
            }
        }

        self.shutdown("inbound").await;
    }

    async fn outbound_loop(self: Arc<Self>) {
        let outbox = lock(&self.outbox).take();
        let Some(mut outbox) = outbox else { return };

        loop {
            let next = tokio::select! {
                _ = self.stop_listen.cancelled() => break,
                next = outbox.recv() => next,
            };
            let Some(frame) = next else {
                debug!(identity = %self.identity, "mailbox closed");
                break;
            };
            let Some(channel) = self.channel() else { break };
            if let Err(e) = channel.send(&frame).await {
                debug!(identity = %self.identity, error = %e, "write failed");
                break;
            }
        }

        self.shutdown("outbound").await;
    }

    async fn shutdown(&self, task: &'static str) {
        if self.close().await.is_ok() {
            debug!(identity = %self.identity, task, "connection closed by task");
        }
    }

    /// Checks the first frame's credentials, marks the connection
    /// authenticated, and registers it under its identity.
    ///
    /// # Errors
    /// - [`MapsyncError::Protocol`] if the frame doesn't decode.
    /// - [`MapsyncError::Session`] if it isn't `authenticate`, or the
    ///   credentials are rejected.
    pub async fn authenticate(self: &Arc<Self>, frame: &[u8]) -> Result<(), MapsyncError> {
        let (_, message) = Message::from_bytes(frame)?;
        let Message::Authenticate(credentials) = message else {
            return Err(SessionError::AuthFailed(format!(
                "first frame must be authenticate, got {}",
                message.function()
            ))
            .into());
        };

        self.hub.auth().authenticate(&credentials).await?;
        self.authenticated.store(true, Ordering::Release);
        info!(identity = %self.identity, "connection authenticated");
        self.register().await;
        Ok(())
    }

    /// Puts this connection in its registry.
    ///
    /// A previous connection under the same identity is superseded: its
    /// recorded map is handed over, then it is closed in the background
    /// without touching the new entry or the player state.
    async fn register(self: &Arc<Self>) {
        let registry = self.hub.connections(self.identity.kind());
        if let Some(old) = registry.set(self.identity.key(), Arc::clone(self)) {
            if self.map_id().is_none() {
                self.set_map_id(old.map_id());
            }
            info!(
                identity = %self.identity,
                old_channel = %old.channel_id,
                "identity reconnected, closing previous connection"
            );
            tokio::spawn(async move {
                let _ = old.close().await;
            });
        }

        // Closed while authenticating: close() found nothing to release.
        if !self.is_open() {
            self.release().await;
        }
    }

    /// Deregisters the connection, removes its player, notifies the map,
    /// closes the channel, and stops both task groups.
    ///
    /// A connection that never authenticated, or was superseded by a
    /// reconnect, only closes its own channel; the registered connection
    /// and the player stay put. A chat connection never owns player state.
    ///
    /// # Errors
    /// [`MapsyncError::NilConnection`] if already closed.
    pub async fn close(&self) -> Result<(), MapsyncError> {
        let channel = lock(&self.channel).take();
        let Some(channel) = channel else {
            debug!(identity = %self.identity, "close on nil connection");
            return Err(MapsyncError::NilConnection(self.identity.to_string()));
        };

        self.release().await;

        if let Err(e) = channel.close().await {
            debug!(identity = %self.identity, error = %e, "channel close failed");
        }
        self.stop_heartbeat.cancel();
        self.stop_listen.cancel();

        info!(identity = %self.identity, "connection closed");
        Ok(())
    }

    /// Deregisters and, for a world connection, takes the player off its
    /// map. A no-op unless this is the registered connection.
    async fn release(&self) {
        let registry = self.hub.connections(self.identity.kind());
        if !registry.delete_if_current(self.identity.key(), self) {
            debug!(identity = %self.identity, "connection not registered, nothing to release");
            return;
        }
        if self.identity.kind() != ChannelKind::World {
            return;
        }

        let transition = self.membership().close();
        if let Some(from) = transition.leaving() {
            debug!(identity = %self.identity, map_id = %from, "leaving map on close");
            router::remove_online_player(self, self.identity.key()).await;
        }
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Enqueues one serialized frame for the outbound task.
    ///
    /// Returns `false` without enqueuing if the frame isn't well-formed, the
    /// connection is closed, or another connection has since taken over
    /// this identity. A full mailbox blocks for up to the configured
    /// publish timeout, then the frame is dropped.
    pub async fn publish(&self, frame: Vec<u8>) -> bool {
        if !self.hub.codec().is_well_formed(&frame) {
            debug!(identity = %self.identity, "refusing to publish malformed frame");
            return false;
        }
        if !self.is_open() {
            debug!(identity = %self.identity, "connection severed, frame not sent");
            return false;
        }
        if !self.is_current() {
            debug!(identity = %self.identity, "stale connection, frame not sent");
            return false;
        }

        let timeout = self.hub.mailbox().publish_timeout;
        match self.mailbox.send_timeout(frame, timeout).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(
                    identity = %self.identity,
                    capacity = self.hub.mailbox().capacity,
                    "mailbox full, dropping frame"
                );
                false
            }
            Err(SendTimeoutError::Closed(_)) => {
                debug!(identity = %self.identity, "mailbox closed, frame not sent");
                false
            }
        }
    }

    /// Encodes `dispatch` and publishes it to this connection.
    pub async fn publish_dispatch<P: Serialize>(&self, dispatch: &Dispatch<P>) -> bool {
        dispatch.publish(Some(self)).await
    }
}

impl<T, S, A> Publisher for Connection<T, S, A>
where
    T: Channel,
    S: AssetStore,
    A: Authenticator,
{
    async fn publish(&self, frame: Vec<u8>) -> bool {
        Connection::publish(self, frame).await
    }
}
