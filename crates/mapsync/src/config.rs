//! Server-wide configuration that doesn't belong to a sub-crate.
//!
//! Heartbeat settings live in [`HeartbeatConfig`](mapsync_heartbeat::HeartbeatConfig)
//! and the shared client secret in
//! [`ClientCredentials`](mapsync_session::ClientCredentials); both are
//! re-exported from the prelude.

use std::time::Duration;

/// Outbound mailbox settings for every connection.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    /// How many serialized frames may wait for the writer. Default: 256.
    pub capacity: usize,
    /// How long a publisher waits on a full mailbox before the frame is
    /// dropped. Default: 1 s.
    pub publish_timeout: Duration,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            publish_timeout: Duration::from_secs(1),
        }
    }
}

impl MailboxConfig {
    /// Clamp out-of-range values; a zero capacity becomes 1.
    pub fn validated(mut self) -> Self {
        if self.capacity == 0 {
            tracing::warn!("mailbox capacity 0 is invalid, using 1");
            self.capacity = 1;
        }
        self
    }
}
