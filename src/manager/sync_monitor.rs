// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Stuck-sync monitor.
//!
//! Follows the handle's replication-progress feed and forces a reconnect
//! when pending work sees no upstream progress for longer than
//! `sync.stuck_threshold_sec`. See [`SyncStatus::observe`] for what counts
//! as progress.

use super::record::{ConnectionRecord, RecordSlot};
use super::Shared;
use crate::error::LifecycleError;
use crate::metrics;
use crate::status::{ConnectionStatus, SyncStatus};
use crate::store::{ObservationChannel, StoreFactory, SyncProgress};
use futures::StreamExt;
use std::sync::{Arc, Weak};
use tokio::time::Instant;
use tracing::{debug, warn};

const CHANNEL: &str = "sync_progress";

pub(super) async fn run<F: StoreFactory>(
    shared: Weak<Shared<F>>,
    store_id: String,
    slot: RecordSlot,
    generation: u64,
    channel: Arc<dyn ObservationChannel<SyncProgress>>,
) {
    let feed = channel.subscribe();

    let seed = async {
        match channel.current().await {
            Ok(progress) => {
                let Some(shared) = shared.upgrade() else {
                    return;
                };
                observe(&shared, &store_id, &slot, generation, progress, true).await;
            }
            Err(e) => {
                let e = LifecycleError::channel(&store_id, CHANNEL, e.to_string());
                channel_failed(&store_id, &slot, generation, &e).await;
            }
        }
    };

    let follow = async {
        let Some(mut feed) = feed else {
            let e = LifecycleError::channel(&store_id, CHANNEL, "feed not supported");
            channel_failed(&store_id, &slot, generation, &e).await;
            return;
        };

        while let Some(progress) = feed.next().await {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            observe(&shared, &store_id, &slot, generation, progress, false).await;
        }

        debug!(store_id = %store_id, "Sync progress feed ended");
    };

    tokio::join!(seed, follow);
}

/// Fold one progress observation into the record.
///
/// A seed (`is_seed`) only fills an empty slot.
pub(super) async fn observe<F: StoreFactory>(
    shared: &Arc<Shared<F>>,
    store_id: &str,
    slot: &RecordSlot,
    generation: u64,
    progress: SyncProgress,
    is_seed: bool,
) {
    let now = Instant::now();
    let event = {
        let mut record = slot.write().await;
        if record.generation != generation {
            return;
        }
        if is_seed && record.sync_status.is_some() {
            debug!(store_id = %store_id, "Sync progress feed arrived first; seed discarded");
            return;
        }

        let next = SyncStatus::observe(record.sync_status.as_ref(), progress, now);
        debug!(
            store_id = %store_id,
            pending_count = next.pending_count,
            upstream_head = %next.upstream_head,
            stalled = next.stuck_since.is_some(),
            "Sync progress observed"
        );
        let stalled = next.stuck_since.is_some();
        record.sync_status = Some(next);

        if stalled {
            shared.check_stuck(store_id, slot, &mut record, now)
        } else {
            None
        }
    };

    shared.emit_all(event);
}

impl<F: StoreFactory> Shared<F> {
    /// Force a reconnect if the record is `connected` and its sync has been
    /// stalled for at least the stuck threshold.
    ///
    /// Returns the disconnect event to emit after the lock is released.
    pub(crate) fn check_stuck(
        self: &Arc<Self>,
        store_id: &str,
        slot: &RecordSlot,
        record: &mut ConnectionRecord,
        now: Instant,
    ) -> Option<crate::events::LifecycleEvent> {
        if record.status != ConnectionStatus::Connected {
            return None;
        }
        let sync = record.sync_status.as_ref()?;
        let threshold = self.config.sync.stuck_threshold();
        if !sync.is_stuck(now, threshold) {
            return None;
        }

        let stuck_for = sync.stuck_for(now).unwrap_or_default();
        warn!(
            store_id = %store_id,
            stuck_for_ms = stuck_for.as_millis() as u64,
            pending_count = sync.pending_count,
            upstream_head = %sync.upstream_head,
            dashboard = %self.config.dashboard(),
            "Sync stuck; forcing reconnect"
        );
        metrics::record_stuck_detected(store_id, stuck_for);

        let event = self.mark_disconnected(record);
        self.schedule_reconnect(store_id, slot, record, "stuck");
        event
    }
}

async fn channel_failed(store_id: &str, slot: &RecordSlot, generation: u64, error: &LifecycleError) {
    debug!(store_id = %store_id, error = %error, "Sync progress monitoring unavailable");
    metrics::record_monitor_error(store_id, CHANNEL);

    let mut record = slot.write().await;
    if record.generation == generation {
        record.error_count += 1;
    }
}
