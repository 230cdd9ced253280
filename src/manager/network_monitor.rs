// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reachability monitor.
//!
//! Subscribes to the handle's reachability feed *before* issuing the
//! one-shot read, so a change that lands between the two is never lost. The
//! seed only fills an empty slot; it never overwrites a value the feed has
//! already delivered.
//!
//! # Transitions
//!
//! - reachable → unreachable: mark `disconnected`, emit, schedule a reconnect
//! - unreachable → reachable while `disconnected`: back to `connected`,
//!   attempt counter reset

use super::record::RecordSlot;
use super::Shared;
use crate::error::LifecycleError;
use crate::metrics;
use crate::status::{ConnectionStatus, NetworkStatus, ReachabilityChange};
use crate::store::{ObservationChannel, Reachability, StoreFactory};
use futures::StreamExt;
use std::sync::{Arc, Weak};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const CHANNEL: &str = "reachability";

pub(super) async fn run<F: StoreFactory>(
    shared: Weak<Shared<F>>,
    store_id: String,
    slot: RecordSlot,
    generation: u64,
    channel: Arc<dyn ObservationChannel<Reachability>>,
) {
    let feed = channel.subscribe();

    let seed = async {
        match channel.current().await {
            Ok(reachability) => seed_status(&store_id, &slot, generation, reachability).await,
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

        while let Some(reachability) = feed.next().await {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            apply(&shared, &store_id, &slot, generation, reachability).await;
        }

        debug!(store_id = %store_id, "Reachability feed ended");
    };

    tokio::join!(seed, follow);
}

async fn seed_status(store_id: &str, slot: &RecordSlot, generation: u64, reachability: Reachability) {
    let mut record = slot.write().await;
    if record.generation != generation {
        return;
    }
    if record.network_status.is_some() {
        debug!(store_id = %store_id, "Reachability feed arrived first; seed discarded");
        return;
    }
    record.network_status = Some(NetworkStatus::seed(reachability, Instant::now()));
    debug!(
        store_id = %store_id,
        is_connected = reachability.is_connected,
        "Reachability seeded"
    );
}

/// Apply one feed update to the record.
pub(super) async fn apply<F: StoreFactory>(
    shared: &Arc<Shared<F>>,
    store_id: &str,
    slot: &RecordSlot,
    generation: u64,
    reachability: Reachability,
) {
    let event = {
        let mut record = slot.write().await;
        if record.generation != generation {
            return;
        }

        let (next, change) = NetworkStatus::observe(record.network_status.as_ref(), reachability, Instant::now());
        record.network_status = Some(next);

        match change {
            ReachabilityChange::Restored => {
                if record.status == ConnectionStatus::Disconnected {
                    record.set_status(ConnectionStatus::Connected);
                    record.reconnect_attempts = 0;
                    info!(store_id = %store_id, "Store reachable again");
                }
                None
            }
            ReachabilityChange::Lost => {
                if record.status == ConnectionStatus::Error {
                    None
                } else {
                    warn!(
                        store_id = %store_id,
                        dashboard = %shared.config.dashboard(),
                        "Store unreachable"
                    );
                    let event = shared.mark_disconnected(&mut record);
                    shared.schedule_reconnect(store_id, slot, &mut record, "network");
                    event
                }
            }
            ReachabilityChange::Unchanged => None,
        }
    };

    shared.emit_all(event);
}

/// Monitoring failures are counted but never change the connection status.
async fn channel_failed(store_id: &str, slot: &RecordSlot, generation: u64, error: &LifecycleError) {
    debug!(store_id = %store_id, error = %error, "Reachability monitoring unavailable");
    metrics::record_monitor_error(store_id, CHANNEL);

    let mut record = slot.write().await;
    if record.generation == generation {
        record.error_count += 1;
    }
}
