// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reconnect scheduling.
//!
//! At most one reconnect task exists per store. It owns the whole retry
//! sequence: wait the flat interval, close the dead handle (first attempt
//! only), open a fresh one with the preserved config, and either install it
//! or retry until the attempt budget runs out. A non-retryable failure ends
//! the sequence early.
//!
//! ```text
//!   schedule ──→ sleep(interval) ──→ Connecting ──→ factory.create
//!                      ↑                                 │
//!                      │ attempts remain          ok ────┼──→ Connected + Reconnected event
//!                      └──────────── failed ─────────────┤
//!                                                        └──→ Error (budget spent or not retryable)
//! ```

use super::record::{ConnectionRecord, RecordSlot};
use super::Shared;
use crate::events::LifecycleEvent;
use crate::metrics;
use crate::resilience::ReconnectPolicy;
use crate::status::ConnectionStatus;
use crate::store::StoreFactory;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

impl<F: StoreFactory> Shared<F> {
    /// Schedule a reconnect for the record unless one is already pending.
    ///
    /// If the attempt budget is already spent the record goes straight to
    /// `error` and nothing is scheduled. `trigger` names the caller for logs
    /// and metrics.
    pub(crate) fn schedule_reconnect(
        self: &Arc<Self>,
        store_id: &str,
        slot: &RecordSlot,
        record: &mut ConnectionRecord,
        trigger: &'static str,
    ) {
        if record.status == ConnectionStatus::Error {
            return;
        }
        if record.has_pending_reconnect() {
            debug!(store_id = %store_id, trigger, "Reconnect already pending");
            return;
        }

        let policy = self.config.reconnect.policy();
        if policy.is_exhausted(record.reconnect_attempts) {
            record.set_status(ConnectionStatus::Error);
            error!(
                store_id = %store_id,
                attempts = record.reconnect_attempts,
                dashboard = %self.config.dashboard(),
                "Reconnect attempts exhausted"
            );
            metrics::record_reconnect_attempt(store_id, "exhausted");
            return;
        }

        let attempt = record.reconnect_attempts + 1;
        let delay = policy.delay_for_attempt(attempt);
        record.reconnect_timer = Some(tokio::spawn(run(
            Arc::downgrade(self),
            store_id.to_string(),
            Arc::clone(slot),
            policy,
        )));

        info!(
            store_id = %store_id,
            trigger,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );
        metrics::record_reconnect_scheduled(store_id, trigger);
    }
}

/// The reconnect task for one store.
async fn run<F: StoreFactory>(weak: Weak<Shared<F>>, store_id: String, slot: RecordSlot, policy: ReconnectPolicy) {
    loop {
        let attempt = slot.read().await.reconnect_attempts + 1;
        tokio::time::sleep(policy.delay_for_attempt(attempt)).await;

        let Some(shared) = weak.upgrade() else {
            return;
        };

        let (dead_handle, config) = {
            let mut record = slot.write().await;
            record.abort_monitors();
            record.set_status(ConnectionStatus::Connecting);
            record.reconnect_attempts += 1;
            let dead_handle = (!record.handle_released).then(|| Arc::clone(&record.handle));
            (dead_handle, record.config.clone())
        };

        if let Some(dead_handle) = dead_handle {
            shared.release_handle(&store_id, dead_handle).await;
            slot.write().await.handle_released = true;
        }

        info!(
            store_id = %store_id,
            attempt,
            max_attempts = policy.max_attempts,
            "Attempting reconnect"
        );

        match shared.create_handle(&store_id, config.clone(), Some(config)).await {
            Ok(handle) => {
                {
                    let mut record = slot.write().await;
                    record.install_handle(Arc::clone(&handle));
                    // Our own handle; dropping it detaches, it does not abort.
                    record.reconnect_timer = None;
                    shared.attach_monitors(&store_id, &slot, &mut record);
                }

                info!(store_id = %store_id, attempt, "Store reconnected");
                metrics::record_reconnect_attempt(&store_id, "success");
                shared.events.emit(LifecycleEvent::Reconnected {
                    store_id: store_id.clone(),
                    handle,
                });
                return;
            }
            Err(e) => {
                let mut record = slot.write().await;
                record.error_count += 1;

                if !e.is_retryable() || policy.is_exhausted(record.reconnect_attempts) {
                    record.set_status(ConnectionStatus::Error);
                    record.reconnect_timer = None;
                    error!(
                        store_id = %store_id,
                        attempts = record.reconnect_attempts,
                        retryable = e.is_retryable(),
                        error = %e,
                        dashboard = %shared.config.dashboard(),
                        "Reconnect failed; giving up"
                    );
                    let outcome = if e.is_retryable() { "exhausted" } else { "fatal" };
                    metrics::record_reconnect_attempt(&store_id, outcome);
                    return;
                }

                warn!(
                    store_id = %store_id,
                    attempt,
                    remaining = policy.attempts_remaining(record.reconnect_attempts),
                    error = %e,
                    "Reconnect attempt failed; retrying"
                );
                metrics::record_reconnect_attempt(&store_id, "failure");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use crate::manager::StoreManager;
    use crate::store::StoreConfig;
    use std::time::Duration;

    async fn disconnected_manager() -> (StoreManager, RecordSlot) {
        let manager = StoreManager::new(ManagerConfig::for_testing()).unwrap();
        manager.add_connection("chat", StoreConfig::default()).await.unwrap();
        let slot = manager.shared().slot("chat").unwrap();
        slot.write().await.status = ConnectionStatus::Disconnected;
        (manager, slot)
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_is_idempotent() {
        let (manager, slot) = disconnected_manager().await;
        {
            let mut record = slot.write().await;
            record.reconnect_timer = Some(tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }));
            manager.shared().schedule_reconnect("chat", &slot, &mut record, "stuck");
        }

        // Only the existing timer is pending; no second reconnect ran.
        tokio::time::sleep(Duration::from_secs(5)).await;
        let record = slot.read().await;
        assert_eq!(record.status, ConnectionStatus::Disconnected);
        assert!(record.has_pending_reconnect());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_with_spent_budget_goes_to_error() {
        let (manager, slot) = disconnected_manager().await;
        let mut record = slot.write().await;
        record.reconnect_attempts = 3;

        manager.shared().schedule_reconnect("chat", &slot, &mut record, "fallback");

        assert_eq!(record.status, ConnectionStatus::Error);
        assert!(record.reconnect_timer.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_replaces_handle_after_interval() {
        let (manager, slot) = disconnected_manager().await;
        let old = manager.get_connection("chat").await.unwrap();
        let mut events = manager.subscribe_channel();

        {
            let mut record = slot.write().await;
            record.reconnect_attempts = 1;
            manager.shared().schedule_reconnect("chat", &slot, &mut record, "network");
        }

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(slot.read().await.status, ConnectionStatus::Disconnected);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let info = manager.get_connection_info("chat").await.unwrap();
        assert_eq!(info.status, ConnectionStatus::Connected);
        assert_eq!(info.reconnect_attempts, 0);
        assert!(!info.reconnect_pending);
        assert!(!Arc::ptr_eq(&old, &info.handle));

        match events.try_recv().unwrap() {
            LifecycleEvent::Reconnected { store_id, handle } => {
                assert_eq!(store_id, "chat");
                assert!(Arc::ptr_eq(&handle, &info.handle));
            }
            other => panic!("Expected Reconnected, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_task_stops_when_manager_dropped() {
        let (manager, slot) = disconnected_manager().await;
        {
            let mut record = slot.write().await;
            manager.shared().schedule_reconnect("chat", &slot, &mut record, "network");
        }
        drop(manager);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(slot.read().await.status, ConnectionStatus::Disconnected);
    }
}
