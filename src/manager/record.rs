// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-store connection record.

use crate::metrics;
use crate::status::{ConnectionStatus, NetworkStatus, SyncStatus};
use crate::store::{StoreConfig, StoreRef};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// A record behind its per-store lock. All mutation for one store id goes
/// through this lock.
pub(crate) type RecordSlot = Arc<RwLock<ConnectionRecord>>;

/// Registry entry for one store.
pub(crate) struct ConnectionRecord {
    pub(crate) store_id: String,
    pub(crate) handle: StoreRef,
    /// Set once the reconnect task has closed `handle`. Cleared when a fresh
    /// handle is installed.
    pub(crate) handle_released: bool,
    pub(crate) config: StoreConfig,
    pub(crate) connected_at: Instant,
    pub(crate) last_activity: Instant,
    pub(crate) status: ConnectionStatus,
    pub(crate) error_count: u32,
    pub(crate) reconnect_attempts: u32,
    pub(crate) sync_status: Option<SyncStatus>,
    pub(crate) network_status: Option<NetworkStatus>,
    /// Bumped whenever monitors are detached. Updates tagged with an older
    /// generation come from a replaced handle and are dropped.
    pub(crate) generation: u64,
    pub(crate) monitors: Vec<JoinHandle<()>>,
    pub(crate) reconnect_timer: Option<JoinHandle<()>>,
}

impl ConnectionRecord {
    pub(crate) fn new(store_id: String, handle: StoreRef, config: StoreConfig) -> Self {
        let now = Instant::now();
        Self {
            store_id,
            handle,
            handle_released: false,
            config,
            connected_at: now,
            last_activity: now,
            status: ConnectionStatus::Connected,
            error_count: 0,
            reconnect_attempts: 0,
            sync_status: None,
            network_status: None,
            generation: 0,
            monitors: Vec::new(),
            reconnect_timer: None,
        }
    }

    /// Change status. Returns `true` if it actually changed.
    pub(crate) fn set_status(&mut self, status: ConnectionStatus) -> bool {
        if self.status == status {
            return false;
        }
        debug!(
            store_id = %self.store_id,
            from = %self.status,
            to = %status,
            "Store status transition"
        );
        self.status = status;
        metrics::record_status_transition(&self.store_id, status.as_str());
        true
    }

    /// Connected, and reachable if reachability is known.
    pub(crate) fn is_healthy(&self) -> bool {
        self.status == ConnectionStatus::Connected
            && self.network_status.map_or(true, |n| n.is_connected)
    }

    pub(crate) fn has_pending_reconnect(&self) -> bool {
        self.reconnect_timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub(crate) fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }

    /// Stop both monitors and invalidate anything they still deliver.
    pub(crate) fn abort_monitors(&mut self) {
        for monitor in self.monitors.drain(..) {
            monitor.abort();
        }
        self.generation += 1;
    }

    /// Swap in a freshly created handle after a successful reconnect.
    ///
    /// Derived statuses are dropped so the new monitors re-derive them, and
    /// both counters start over.
    pub(crate) fn install_handle(&mut self, handle: StoreRef) {
        let now = Instant::now();
        self.abort_monitors();
        self.handle = handle;
        self.handle_released = false;
        self.sync_status = None;
        self.network_status = None;
        self.error_count = 0;
        self.reconnect_attempts = 0;
        self.connected_at = now;
        self.last_activity = now;
        self.set_status(ConnectionStatus::Connected);
    }

    pub(crate) fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            store_id: self.store_id.clone(),
            handle: Arc::clone(&self.handle),
            config: self.config.clone(),
            connected_at: self.connected_at,
            last_activity: self.last_activity,
            status: self.status,
            error_count: self.error_count,
            reconnect_attempts: self.reconnect_attempts,
            sync_status: self.sync_status.clone(),
            network_status: self.network_status,
            reconnect_pending: self.has_pending_reconnect(),
        }
    }
}

/// Point-in-time copy of a connection record.
#[derive(Clone)]
pub struct ConnectionInfo {
    pub store_id: String,
    pub handle: StoreRef,
    pub config: StoreConfig,
    pub connected_at: Instant,
    pub last_activity: Instant,
    pub status: ConnectionStatus,
    pub error_count: u32,
    pub reconnect_attempts: u32,
    pub sync_status: Option<SyncStatus>,
    pub network_status: Option<NetworkStatus>,
    pub reconnect_pending: bool,
}

impl std::fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("store_id", &self.store_id)
            .field("status", &self.status)
            .field("error_count", &self.error_count)
            .field("reconnect_attempts", &self.reconnect_attempts)
            .field("sync_status", &self.sync_status)
            .field("network_status", &self.network_status)
            .field("reconnect_pending", &self.reconnect_pending)
            .finish_non_exhaustive()
    }
}
