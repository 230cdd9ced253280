//! Connection status types.
//!
//! Defines the per-connection state machine and the derived sync/network
//! views the monitors maintain.
//!
//! # State Transitions
//!
//! ```text
//!               reachability loss / stuck sync / health fallback
//!  Connected ─────────────────────────────────────────────→ Disconnected
//!      ↑                                                          │
//!      │ handle replaced                          timer fires     │
//!      └──────────────────── Connecting ←─────────────────────────┘
//!                                │   ↺ creation failed, attempts remain
//!                                │
//!                                ↓ creation failed, attempts exhausted
//!                              Error   (terminal until removed and re-added)
//! ```
//!
//! # Stuck Detection
//!
//! Progress means `upstream_head` changed. A falling `pending_count` is not
//! progress on its own, and a rising one (new local work) must not reset the
//! stall timer. See [`SyncStatus::observe`].

use crate::store::{Reachability, SyncProgress};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// State of a managed store connection.
///
/// See module docs for the state transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Handle is live.
    Connected,
    /// A reconnect attempt is in progress.
    Connecting,
    /// Handle considered dead; a reconnect may be pending.
    Disconnected,
    /// Reconnect attempts exhausted. Requires remove + add to recover.
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived replication progress. Replaced wholesale on every observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub pending_count: u64,
    pub local_head: String,
    pub upstream_head: String,
    pub is_synced: bool,
    pub last_updated_at: Instant,
    /// When pending work stopped seeing upstream progress.
    pub stuck_since: Option<Instant>,
}

impl SyncStatus {
    /// Derive the next status from the previous one and a new observation.
    ///
    /// - `pending == 0` clears `stuck_since`
    /// - pending work with no previous stall starts one at `now`
    /// - pending work with a previous stall carries it forward while
    ///   `upstream_head` is unchanged, and clears it once it moves
    pub fn observe(previous: Option<&SyncStatus>, progress: SyncProgress, now: Instant) -> Self {
        let stuck_since = if progress.pending_count == 0 {
            None
        } else {
            match previous.and_then(|p| p.stuck_since.map(|since| (since, &p.upstream_head))) {
                None => Some(now),
                Some((since, prev_upstream)) if *prev_upstream == progress.upstream_head => Some(since),
                Some(_) => None,
            }
        };

        Self {
            is_synced: progress.pending_count == 0,
            pending_count: progress.pending_count,
            local_head: progress.local_head,
            upstream_head: progress.upstream_head,
            last_updated_at: now,
            stuck_since,
        }
    }

    /// How long the current stall has lasted.
    pub fn stuck_for(&self, now: Instant) -> Option<Duration> {
        self.stuck_since.map(|since| now.saturating_duration_since(since))
    }

    /// Whether the stall has reached `threshold`.
    pub fn is_stuck(&self, now: Instant, threshold: Duration) -> bool {
        self.stuck_for(now).is_some_and(|d| d >= threshold)
    }
}

/// Derived reachability view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStatus {
    pub is_connected: bool,
    pub last_updated_at: Instant,
    pub disconnected_since: Option<Instant>,
}

/// Edge detected between two reachability observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachabilityChange {
    /// false → true
    Restored,
    /// true → false
    Lost,
    /// No flip.
    Unchanged,
}

impl NetworkStatus {
    /// Status seeded from a one-shot read (no transition implied).
    pub fn seed(reachability: Reachability, now: Instant) -> Self {
        Self {
            is_connected: reachability.is_connected,
            last_updated_at: now,
            disconnected_since: (!reachability.is_connected).then_some(now),
        }
    }

    /// Derive the next status from a feed update.
    ///
    /// A missing previous status counts as connected.
    pub fn observe(previous: Option<&NetworkStatus>, reachability: Reachability, now: Instant) -> (Self, ReachabilityChange) {
        let was_connected = previous.map_or(true, |p| p.is_connected);
        let carried = previous.and_then(|p| p.disconnected_since);

        match (was_connected, reachability.is_connected) {
            (false, true) => (
                Self {
                    is_connected: true,
                    last_updated_at: now,
                    disconnected_since: None,
                },
                ReachabilityChange::Restored,
            ),
            (true, false) => (
                Self {
                    is_connected: false,
                    last_updated_at: now,
                    disconnected_since: Some(now),
                },
                ReachabilityChange::Lost,
            ),
            (_, is_connected) => (
                Self {
                    is_connected,
                    last_updated_at: now,
                    disconnected_since: if is_connected { None } else { carried.or(Some(now)) },
                },
                ReachabilityChange::Unchanged,
            ),
        }
    }

    /// How long the store has been unreachable.
    pub fn disconnected_for(&self, now: Instant) -> Option<Duration> {
        self.disconnected_since.map(|since| now.saturating_duration_since(since))
    }
}
