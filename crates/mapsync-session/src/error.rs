//! Error types for the session layer.

/// Errors that can occur while identifying, authenticating, or looking up
/// connections.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The first frame did not carry the configured client id and secret.
    /// Always fatal for the connection that sent it.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No connection is registered under the given key.
    #[error("connection not found for {0}")]
    ConnectionNotFound(String),

    /// The identity supplied at upgrade time is unusable
    /// (empty, or `chat::` with no user after it).
    #[error("invalid connection identity {0:?}")]
    InvalidIdentity(String),
}
