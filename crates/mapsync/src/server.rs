//! `MapsyncServer` builder and accept loop.
//!
//! This is the entry point for running a mapsync server. It ties the
//! layers together: transport → identity → connection → router.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use mapsync_heartbeat::HeartbeatConfig;
use mapsync_session::{Authenticator, ClientCredentials, Identity};
use mapsync_transport::{
    Channel, DEFAULT_HANDSHAKE_TIMEOUT, Transport, TransportError, WebSocketChannel,
    WebSocketTransport,
};
use tracing::{error, info, warn};

use crate::MapsyncError;
use crate::config::MailboxConfig;
use crate::connection::Connection;
use crate::hub::Hub;
use crate::store::AssetStore;

/// Builder for configuring and starting a mapsync server.
///
/// # Example
///
/// ```rust,no_run
/// use mapsync::prelude::*;
///
/// # async fn run() -> Result<(), MapsyncError> {
/// let server = MapsyncServerBuilder::new()
///     .bind("0.0.0.0:9191")
///     .credentials(ClientCredentials::new("game", "s3cret"))
///     .build(MemoryAssetStore::new())
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct MapsyncServerBuilder {
    bind_addr: String,
    credentials: ClientCredentials,
    heartbeat: HeartbeatConfig,
    mailbox: MailboxConfig,
    handshake_timeout: Duration,
}

impl MapsyncServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "0.0.0.0:9191".to_string(),
            credentials: ClientCredentials::default(),
            heartbeat: HeartbeatConfig::default(),
            mailbox: MailboxConfig::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the client id and secret every connection must present.
    pub fn credentials(mut self, credentials: ClientCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn heartbeat(mut self, config: HeartbeatConfig) -> Self {
        self.heartbeat = config;
        self
    }

    pub fn mailbox(mut self, config: MailboxConfig) -> Self {
        self.mailbox = config;
        self
    }

    /// How long a client may take to finish the WebSocket upgrade.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Binds the listener, authenticating with the configured credentials.
    pub async fn build<S: AssetStore>(self, store: S) -> Result<MapsyncServer<S>, MapsyncError> {
        let credentials = self.credentials.clone();
        self.build_with_auth(store, credentials).await
    }

    /// Binds the listener with a custom [`Authenticator`].
    pub async fn build_with_auth<S, A>(
        self,
        store: S,
        auth: A,
    ) -> Result<MapsyncServer<S, A>, MapsyncError>
    where
        S: AssetStore,
        A: Authenticator,
    {
        let transport = WebSocketTransport::bind(&self.bind_addr)
            .await?
            .with_handshake_timeout(self.handshake_timeout);
        let hub = Hub::new(store, auth)
            .with_heartbeat(self.heartbeat)
            .with_mailbox(self.mailbox);

        Ok(MapsyncServer {
            transport,
            hub: Arc::new(hub),
        })
    }
}

impl Default for MapsyncServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound mapsync server.
///
/// Call [`run`](Self::run) to start accepting connections.
pub struct MapsyncServer<S, A = ClientCredentials> {
    transport: WebSocketTransport,
    hub: Arc<Hub<WebSocketChannel, S, A>>,
}

impl<S, A> MapsyncServer<S, A>
where
    S: AssetStore,
    A: Authenticator,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The shared registries, for inspection.
    pub fn hub(&self) -> Arc<Hub<WebSocketChannel, S, A>> {
        Arc::clone(&self.hub)
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), MapsyncError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then closes every
    /// open connection.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), MapsyncError> {
        info!(addr = ?self.local_addr().ok(), "mapsync server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(channel) => self.admit(channel),
                    Err(TransportError::AcceptFailed(e)) => error!(error = %e, "accept failed"),
                    Err(e) => warn!(error = %e, "handshake failed"),
                },
            }
        }

        info!("shutting down, closing open connections");
        let open = self
            .hub
            .world()
            .get_all()
            .into_iter()
            .chain(self.hub.chat().get_all());
        for conn in open {
            let _ = conn.close().await;
        }
        Ok(())
    }

    /// Turns an upgraded channel into a running connection.
    fn admit(&self, channel: WebSocketChannel) {
        let raw = identity_from_path(channel.path()).to_owned();
        let identity = match Identity::parse(raw) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, channel = %channel.id(), "rejecting channel");
                tokio::spawn(async move {
                    let _ = channel.close().await;
                });
                return;
            }
        };

        let conn = Connection::new(Arc::clone(&self.hub), identity, channel);
        tokio::spawn(conn.listen());
    }
}

/// Extracts the connection identity from an upgrade path.
///
/// Both `/ws/<identity>` and `/<identity>` are accepted.
pub fn identity_from_path(path: &str) -> &str {
    let path = path.trim_start_matches('/');
    path.strip_prefix("ws/").unwrap_or(path)
}
