//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Each accepted stream is split into a sink and a stream half so that the
//! reader task can block on the next frame while the writer and heartbeat
//! tasks keep sending.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};

use crate::{Channel, ChannelId, Transport, TransportError};

/// Counter for generating unique channel IDs.
static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TcpStream>;

/// How long a client gets to finish the upgrade handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A WebSocket-based [`Transport`] that listens for incoming connections.
///
/// Handshakes run on their own tasks, so a client that opens a TCP stream
/// and never upgrades only holds up itself.
pub struct WebSocketTransport {
    listener: TcpListener,
    /// Handshakes in flight.
    pending: Mutex<JoinSet<Result<WebSocketChannel, TransportError>>>,
    handshake_timeout: Duration,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            pending: Mutex::new(JoinSet::new()),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        })
    }

    /// Sets how long a client may take to complete the upgrade.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Channel = WebSocketChannel;
    type Error = TransportError;

    /// Returns the next channel whose handshake finished, or the next
    /// handshake failure. TCP accepts keep flowing while handshakes are
    /// pending.
    async fn accept(&mut self) -> Result<Self::Channel, Self::Error> {
        let limit = self.handshake_timeout;
        let pending = self.pending.get_mut();

        loop {
            let in_flight = !pending.is_empty();
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, addr) =
                        accepted.map_err(TransportError::AcceptFailed)?;
                    pending.spawn(upgrade(stream, addr, limit));
                }
                Some(joined) = pending.join_next(), if in_flight => {
                    return joined.unwrap_or_else(|e| {
                        Err(TransportError::UpgradeFailed(e.to_string()))
                    });
                }
            }
        }
    }
}

/// Runs the upgrade handshake for one TCP stream.
async fn upgrade(
    stream: TcpStream,
    addr: SocketAddr,
    limit: Duration,
) -> Result<WebSocketChannel, TransportError> {
    // The request path carries the client's identity; capture it during
    // the handshake.
    let mut path = String::new();
    let handshake = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            path = req.uri().path().to_owned();
            Ok(resp)
        },
    );
    let ws = tokio::time::timeout(limit, handshake)
        .await
        .map_err(|_| TransportError::HandshakeTimeout(addr))?
        .map_err(|e| TransportError::UpgradeFailed(e.to_string()))?;

    let id = ChannelId::new(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed));
    tracing::debug!(%id, %addr, %path, "accepted WebSocket channel");

    let (sink, stream) = ws.split();
    Ok(WebSocketChannel {
        id,
        path,
        sink: Mutex::new(sink),
        stream: Mutex::new(stream),
        last_pong: StdMutex::new(Instant::now()),
    })
}

/// A single upgraded WebSocket channel.
pub struct WebSocketChannel {
    id: ChannelId,
    path: String,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    last_pong: StdMutex<Instant>,
}

impl WebSocketChannel {
    /// The request path the client upgraded on (e.g. `/ws/alice`).
    pub fn path(&self) -> &str {
        &self.path
    }

    fn pong_clock(&self) -> MutexGuard<'_, Instant> {
        self.last_pong.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn write(&self, msg: Message) -> Result<(), TransportError> {
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }
}

impl Channel for WebSocketChannel {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        // Envelopes are JSON, so they go out as text frames. Anything that
        // isn't UTF-8 falls back to a binary frame.
        let msg = match String::from_utf8(data.to_vec()) {
            Ok(text) => Message::text(text),
            Err(e) => Message::Binary(e.into_bytes().into()),
        };
        self.write(msg).await
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        loop {
            let msg = self.stream.lock().await.next().await;
            match msg {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.to_vec()));
                }
                Some(Ok(Message::Pong(_))) => {
                    *self.pong_clock() = Instant::now();
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping / raw frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn ping(&self) -> Result<(), Self::Error> {
        self.write(Message::Ping(Vec::new().into())).await
    }

    fn last_pong(&self) -> Instant {
        *self.pong_clock()
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ChannelId {
        self.id
    }
}
