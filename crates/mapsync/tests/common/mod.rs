//! Shared helpers: an in-memory channel and a hub wired to it.

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mapsync::prelude::*;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const CLIENT_ID: &str = "game";
pub const CLIENT_SECRET: &str = "s3cret";

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

// =========================================================================
// MockChannel: the server side of an in-memory channel
// =========================================================================

pub struct MockChannel {
    id: ChannelId,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    state: Arc<PeerState>,
}

/// State both ends can observe.
pub struct PeerState {
    pub closed: AtomicBool,
    /// Makes the next `ping` fail as a dead socket would.
    pub fail_ping: AtomicBool,
    /// Makes the next `send` fail as a dead socket would.
    pub fail_send: AtomicBool,
    pub pings: AtomicUsize,
    pub auto_pong: AtomicBool,
    pub last_pong: Mutex<Instant>,
}

impl Channel for MockChannel {
    type Error = io::Error;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        if self.state.fail_send.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "send failed"));
        }
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        }
        self.outbound
            .send(data.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn ping(&self) -> Result<(), Self::Error> {
        if self.state.fail_ping.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "ping failed"));
        }
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        }
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        if self.state.auto_pong.load(Ordering::SeqCst) {
            *self.state.last_pong.lock().unwrap() = Instant::now();
        }
        Ok(())
    }

    fn last_pong(&self) -> Instant {
        *self.state.last_pong.lock().unwrap()
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn id(&self) -> ChannelId {
        self.id
    }
}

// =========================================================================
// MockPeer: the client side
// =========================================================================

pub struct MockPeer {
    inbound: mpsc::UnboundedSender<Vec<u8>>,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    pub state: Arc<PeerState>,
}

pub fn channel_pair() -> (MockChannel, MockPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let state = Arc::new(PeerState {
        closed: AtomicBool::new(false),
        fail_ping: AtomicBool::new(false),
        fail_send: AtomicBool::new(false),
        pings: AtomicUsize::new(0),
        auto_pong: AtomicBool::new(true),
        last_pong: Mutex::new(Instant::now()),
    });
    let channel = MockChannel {
        id: ChannelId::new(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
        inbound: tokio::sync::Mutex::new(in_rx),
        outbound: out_tx,
        state: Arc::clone(&state),
    };
    let peer = MockPeer {
        inbound: in_tx,
        outbound: out_rx,
        state,
    };
    (channel, peer)
}

impl MockPeer {
    pub fn send_raw(&self, bytes: &[u8]) {
        let _ = self.inbound.send(bytes.to_vec());
    }

    pub fn send(&self, frame: Value) {
        self.send_raw(&serde_json::to_vec(&frame).unwrap());
    }

    pub fn send_auth(&self, id: &str, secret: &str) {
        self.send(auth_frame(id, secret));
    }

    pub fn send_update(&self, player: &Player) {
        self.send(json!({"id": "u", "function": "update_player", "data": player}));
    }

    pub fn send_chat(&self, user_id: &str, username: &str, message: &str) {
        self.send(json!({
            "id": "c",
            "function": "chat",
            "data": {"user_id": user_id, "username": username, "message": message}
        }));
    }

    /// Next frame the server wrote, or `None` after one second.
    pub async fn next_frame(&mut self) -> Option<Value> {
        let bytes = tokio::time::timeout(Duration::from_secs(1), self.outbound.recv())
            .await
            .ok()??;
        Some(serde_json::from_slice(&bytes).unwrap())
    }

    /// Next frame with the given function, skipping others.
    pub async fn next_of(&mut self, function: &str) -> Option<Value> {
        while let Some(frame) = self.next_frame().await {
            if frame["function"] == function {
                return Some(frame);
            }
        }
        None
    }

    /// `true` if nothing arrives within 150 ms.
    pub async fn is_silent(&mut self) -> bool {
        tokio::time::timeout(Duration::from_millis(150), self.outbound.recv())
            .await
            .is_err()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.state.pings.load(Ordering::SeqCst)
    }
}

pub fn auth_frame(id: &str, secret: &str) -> Value {
    json!({
        "id": "auth",
        "function": "authenticate",
        "data": {"CLIENT_ID": [id], "CLIENT_SECRET": [secret]}
    })
}

// =========================================================================
// Hub wiring
// =========================================================================

pub type TestHub = Hub<MockChannel, MemoryAssetStore>;
pub type TestConn = Connection<MockChannel, MemoryAssetStore>;

/// Heartbeat that won't fire during a normal test.
pub fn quiet_heartbeat() -> HeartbeatConfig {
    HeartbeatConfig {
        interval: Duration::from_secs(3600),
        initial_jitter: Duration::ZERO,
        ..Default::default()
    }
}

pub fn hub_with(store: MemoryAssetStore) -> Arc<TestHub> {
    hub_with_heartbeat(store, quiet_heartbeat())
}

pub fn hub_with_heartbeat(store: MemoryAssetStore, heartbeat: HeartbeatConfig) -> Arc<TestHub> {
    Arc::new(
        Hub::new(store, ClientCredentials::new(CLIENT_ID, CLIENT_SECRET)).with_heartbeat(heartbeat),
    )
}

pub fn users_store(users: &[&str]) -> MemoryAssetStore {
    MemoryAssetStore::from_assets(users.iter().map(|u| sprite(u))).unwrap()
}

pub fn sprite(user: &str) -> CharacterAsset {
    CharacterAsset {
        id: Some(format!("{user}-down")),
        user_id: user.into(),
        name: format!("{user} down"),
        asset_type: AssetType::PlayerDown,
        x: 0,
        y: 0,
        width: 1,
        height: 1,
        data: vec![vec![Pixel {
            x: 0,
            y: 0,
            r: 0,
            g: 0,
            b: 0,
            a: 255,
            color: "#000000".into(),
        }]],
    }
}

/// A hub whose store has one sprite for each of `users`.
pub fn hub_for(users: &[&str]) -> Arc<TestHub> {
    hub_with(users_store(users))
}

/// Opens a connection and starts its tasks, without authenticating.
pub fn open(hub: &Arc<TestHub>, identity: &str) -> (Arc<TestConn>, MockPeer) {
    let (channel, peer) = channel_pair();
    let conn = Connection::new(Arc::clone(hub), Identity::parse(identity).unwrap(), channel);
    tokio::spawn(Arc::clone(&conn).listen());
    (conn, peer)
}

/// Opens and authenticates a connection, waiting until it is the
/// registered one for its identity.
pub async fn join(hub: &Arc<TestHub>, identity: &str) -> (Arc<TestConn>, MockPeer) {
    let (conn, peer) = open(hub, identity);
    peer.send_auth(CLIENT_ID, CLIENT_SECRET);
    let (h, c) = (Arc::clone(hub), Arc::clone(&conn));
    eventually(move || {
        let key = c.identity().key();
        c.is_authenticated() && h.connections(c.identity().kind()).is_current(key, &c)
    })
    .await;
    (conn, peer)
}

/// Authenticates `conn` directly, without its tasks running.
pub async fn authenticate(conn: &Arc<TestConn>) {
    let frame = serde_json::to_vec(&auth_frame(CLIENT_ID, CLIENT_SECRET)).unwrap();
    conn.authenticate(&frame).await.unwrap();
}

/// Opens, authenticates, and places a world connection on `map`, waiting
/// until the registry reflects it.
pub async fn place(hub: &Arc<TestHub>, user: &str, map: &str) -> (Arc<TestConn>, MockPeer) {
    let (conn, peer) = join(hub, user).await;
    peer.send_update(&Player::new(user, map));
    let (h, u, m) = (Arc::clone(hub), user.to_owned(), map.to_owned());
    eventually(move || h.players().get(&m, &u).is_some()).await;
    (conn, peer)
}

/// Polls `cond` every 5 ms for up to two seconds.
pub async fn eventually(cond: impl Fn() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}
