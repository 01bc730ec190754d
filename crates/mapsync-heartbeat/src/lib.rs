//! Per-connection heartbeat scheduling and liveness checks for mapsync.
//!
//! Every connection runs one heartbeat task. Each beat the task writes a
//! ping frame; the transport records when the matching pong comes back.
//! [`Heartbeat::liveness`] turns that timestamp into a verdict: a peer that
//! has been silent for longer than `interval × timeout_multiplier` is
//! expired and gets evicted.
//!
//! # Integration
//!
//! The scheduler sits inside the connection's heartbeat loop next to its
//! stop signal:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = stop.cancelled() => break,
//!         _ = heartbeat.wait_for_beat() => {
//!             if heartbeat.liveness(channel.last_pong()).is_expired() { break; }
//!             if channel.ping().await.is_err() { break; }
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Heartbeat settings shared by every connection.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Time between pings. Default: 10 s.
    pub interval: Duration,
    /// A peer silent for `interval × timeout_multiplier` is expired.
    /// Default: 3.
    pub timeout_multiplier: u32,
    /// When `false`, pings are still sent but silence never evicts.
    pub evict_on_timeout: bool,
    /// Random delay (0..max) added to the *first* beat so connections
    /// accepted together don't ping in lockstep.
    pub initial_jitter: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout_multiplier: 3,
            evict_on_timeout: true,
            initial_jitter: Duration::from_millis(500),
        }
    }
}

impl HeartbeatConfig {
    /// Shortest interval accepted; anything lower is clamped.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

    /// A config for a specific interval with the other defaults.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Clamp out-of-range values. Called by [`Heartbeat::new`].
    ///
    /// - `interval` raised to [`Self::MIN_INTERVAL`].
    /// - `timeout_multiplier` raised to 1.
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                "heartbeat interval too short, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        if self.timeout_multiplier == 0 {
            self.timeout_multiplier = 1;
        }
        self
    }

    /// How long a peer may stay silent before it is expired.
    pub fn timeout(&self) -> Duration {
        self.interval * self.timeout_multiplier
    }
}

// ---------------------------------------------------------------------------
// Beat info / liveness
// ---------------------------------------------------------------------------

/// Returned by [`Heartbeat::wait_for_beat`].
#[derive(Debug, Clone, Copy)]
pub struct BeatInfo {
    /// Monotonically increasing beat number (starts at 1).
    pub beat: u64,
    /// How late the beat fired relative to its schedule.
    pub late_by: Duration,
}

/// Verdict on whether a peer is still answering pings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Expired { silent_for: Duration },
}

impl Liveness {
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Ping cadence for one connection.
pub struct Heartbeat {
    config: HeartbeatConfig,
    next_beat: Instant,
    beat_count: u64,
}

impl Heartbeat {
    /// Creates a heartbeat whose first beat is one interval (plus jitter)
    /// from now.
    pub fn new(config: HeartbeatConfig) -> Self {
        let config = config.validated();
        let max_jitter_us = config.initial_jitter.as_micros() as u64;
        let jitter = if max_jitter_us == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(rand::rng().random_range(0..max_jitter_us))
        };
        debug!(
            interval_ms = config.interval.as_millis() as u64,
            timeout_ms = config.timeout().as_millis() as u64,
            "heartbeat created"
        );
        Self {
            next_beat: Instant::now() + config.interval + jitter,
            beat_count: 0,
            config,
        }
    }

    /// Waits until the next beat is due.
    ///
    /// A late wake-up doesn't cause a burst of catch-up beats; the next
    /// one is scheduled a full interval from now.
    pub async fn wait_for_beat(&mut self) -> BeatInfo {
        time::sleep_until(self.next_beat).await;

        let now = Instant::now();
        let late_by = now.saturating_duration_since(self.next_beat);
        self.beat_count += 1;
        self.next_beat = now + self.config.interval;

        trace!(beat = self.beat_count, "heartbeat fired");
        BeatInfo {
            beat: self.beat_count,
            late_by,
        }
    }

    /// Judges a peer by when its last pong arrived.
    pub fn liveness(&self, last_pong: Instant) -> Liveness {
        if !self.config.evict_on_timeout {
            return Liveness::Alive;
        }
        let silent_for = Instant::now().saturating_duration_since(last_pong);
        if silent_for > self.config.timeout() {
            Liveness::Expired { silent_for }
        } else {
            Liveness::Alive
        }
    }

    pub fn beat_count(&self) -> u64 {
        self.beat_count
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }
}
