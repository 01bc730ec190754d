//! Authentication hook for the first frame of every connection.
//!
//! mapsync does not manage user accounts. A connection proves it belongs to
//! a trusted game client by sending the shared client id and secret in its
//! first `authenticate` envelope. The [`Authenticator`] trait is the seam;
//! [`ClientCredentials`] is the implementation the server uses by default.
//!
//! Tests and embedders can swap in their own implementation (an external
//! config service, a mock that always accepts) without touching the
//! connection code.

use std::fmt;

use mapsync_protocol::Credentials;

use crate::SessionError;

/// Validates the credentials a client sent in its `authenticate` frame.
///
/// - `Send + Sync` → shared by every connection task.
/// - `'static` → lives as long as the server.
///
/// # Example
///
/// ```rust
/// use mapsync_protocol::Credentials;
/// use mapsync_session::{Authenticator, SessionError};
///
/// /// Accepts anyone who sends a client id at all.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(&self, creds: &Credentials) -> Result<(), SessionError> {
///         creds
///             .client_id()
///             .map(|_| ())
///             .ok_or_else(|| SessionError::AuthFailed("no client id".into()))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Returns `Ok(())` if the credentials are accepted.
    ///
    /// # Errors
    /// [`SessionError::AuthFailed`] if they are missing or wrong.
    fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> impl std::future::Future<Output = Result<(), SessionError>> + Send;
}

/// The configured client id and secret every connection must present.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Checks the first value of each header against the configured pair.
    pub fn matches(&self, credentials: &Credentials) -> Result<(), SessionError> {
        let id = credentials
            .client_id()
            .ok_or_else(|| SessionError::AuthFailed("missing client id".into()))?;
        let secret = credentials
            .client_secret()
            .ok_or_else(|| SessionError::AuthFailed("missing client secret".into()))?;

        if id != self.client_id || secret != self.client_secret {
            return Err(SessionError::AuthFailed("client id or secret mismatch".into()));
        }
        Ok(())
    }
}

impl Authenticator for ClientCredentials {
    async fn authenticate(&self, credentials: &Credentials) -> Result<(), SessionError> {
        self.matches(credentials)
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}
