// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Periodic health reconciliation and the health snapshot.
//!
//! The loop is a safety net behind the monitors. Each pass:
//! 1. Aligns `status` with the last known reachability in both directions
//! 2. Forces a reconnect for stores unreachable past the fallback threshold
//! 3. Re-evaluates stuck sync for `connected` stores
//!
//! A pass that panics is logged and the loop keeps its schedule.

use super::record::{ConnectionRecord, RecordSlot};
use super::Shared;
use crate::error::LifecycleError;
use crate::events::LifecycleEvent;
use crate::metrics;
use crate::resilience::panic_message;
use crate::status::ConnectionStatus;
use crate::store::StoreFactory;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Aggregate health across every managed store.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Every store is `connected` and, where known, reachable.
    pub healthy: bool,
    /// Per-store detail, ordered by store id.
    pub stores: Vec<StoreHealth>,
}

impl HealthStatus {
    pub fn store(&self, store_id: &str) -> Option<&StoreHealth> {
        self.stores.iter().find(|s| s.store_id == store_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub store_id: String,
    pub status: ConnectionStatus,
    pub healthy: bool,
    pub error_count: u32,
    pub reconnect_attempts: u32,
    pub reconnect_pending: bool,
    pub connected_for_ms: u64,
    pub idle_ms: u64,
    pub network: Option<NetworkHealth>,
    pub sync: Option<SyncHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkHealth {
    pub is_connected: bool,
    pub disconnected_for_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncHealth {
    pub pending_count: u64,
    pub is_synced: bool,
    pub local_head: String,
    pub upstream_head: String,
    pub stuck_for_ms: Option<u64>,
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

impl StoreHealth {
    fn from_record(record: &ConnectionRecord, now: Instant) -> Self {
        Self {
            store_id: record.store_id.clone(),
            status: record.status,
            healthy: record.is_healthy(),
            error_count: record.error_count,
            reconnect_attempts: record.reconnect_attempts,
            reconnect_pending: record.has_pending_reconnect(),
            connected_for_ms: millis(now.saturating_duration_since(record.connected_at)),
            idle_ms: millis(now.saturating_duration_since(record.last_activity)),
            network: record.network_status.map(|n| NetworkHealth {
                is_connected: n.is_connected,
                disconnected_for_ms: n.disconnected_for(now).map(millis),
            }),
            sync: record.sync_status.as_ref().map(|s| SyncHealth {
                pending_count: s.pending_count,
                is_synced: s.is_synced,
                local_head: s.local_head.clone(),
                upstream_head: s.upstream_head.clone(),
                stuck_for_ms: s.stuck_for(now).map(millis),
            }),
        }
    }
}

impl<F: StoreFactory> Shared<F> {
    pub(crate) async fn health_status(&self) -> HealthStatus {
        let now = Instant::now();
        let mut stores = Vec::with_capacity(self.records.len());
        for (_, slot) in self.snapshot() {
            stores.push(StoreHealth::from_record(&*slot.read().await, now));
        }
        stores.sort_by(|a, b| a.store_id.cmp(&b.store_id));

        HealthStatus {
            healthy: stores.iter().all(|s| s.healthy),
            stores,
        }
    }

    /// Spawn the health loop unless it is already running.
    pub(crate) async fn ensure_health_loop(self: &Arc<Self>) {
        let mut task = self.health_task.lock().await;
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let period = self.config.health.interval();
        *task = Some(tokio::spawn(run(Arc::downgrade(self), period)));
        info!(interval_sec = period.as_secs(), "Health check loop started");
    }

    /// One reconciliation pass over every store. Returns overall health.
    pub(crate) async fn health_pass(self: &Arc<Self>) -> bool {
        let now = Instant::now();
        let mut healthy = true;

        for (store_id, slot) in self.snapshot() {
            let events = {
                let mut record = slot.write().await;
                let events = self.reconcile(&store_id, &slot, &mut record, now);
                healthy &= record.is_healthy();
                events
            };
            self.emit_all(events);
        }

        healthy
    }

    fn reconcile(
        self: &Arc<Self>,
        store_id: &str,
        slot: &RecordSlot,
        record: &mut ConnectionRecord,
        now: Instant,
    ) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();

        if let Some(network) = record.network_status {
            if network.is_connected {
                // A pending reconnect owns the status until it resolves.
                if record.status == ConnectionStatus::Disconnected && !record.has_pending_reconnect() {
                    record.set_status(ConnectionStatus::Connected);
                    info!(store_id = %store_id, "Health check: reachable store marked connected");
                }
            } else {
                if let Some(event) = self.mark_disconnected(record) {
                    warn!(store_id = %store_id, "Health check: unreachable store marked disconnected");
                    events.push(event);
                }

                let threshold = self.config.health.fallback_threshold();
                let down_for = network.disconnected_for(now).unwrap_or_default();
                if down_for > threshold && record.status != ConnectionStatus::Error {
                    warn!(
                        store_id = %store_id,
                        down_for_ms = millis(down_for),
                        dashboard = %self.config.dashboard(),
                        "Health check: unreachable past fallback threshold; forcing reconnect"
                    );
                    self.schedule_reconnect(store_id, slot, record, "fallback");
                }
            }
        }

        let stalled = record.sync_status.as_ref().is_some_and(|s| s.stuck_since.is_some());
        if stalled {
            events.extend(self.check_stuck(store_id, slot, record, now));
        }

        events
    }
}

async fn run<F: StoreFactory>(weak: Weak<Shared<F>>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(shared) = weak.upgrade() else {
            debug!("Store manager dropped; health check loop exiting");
            return;
        };

        let started = std::time::Instant::now();
        match AssertUnwindSafe(shared.health_pass()).catch_unwind().await {
            Ok(healthy) => {
                metrics::record_health_pass(started.elapsed(), healthy);
                debug!(healthy, stores = shared.records.len(), "Health check pass complete");
            }
            Err(panic) => {
                let e = LifecycleError::Internal(format!(
                    "health check pass panicked: {}",
                    panic_message(panic.as_ref())
                ));
                error!(error = %e, "Health check pass failed; continuing");
                metrics::record_health_pass_failure();
            }
        }
    }
}
