// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Store connection manager.
//!
//! The registry that owns every managed store handle and keeps it alive:
//! - Reachability monitoring via [`network_monitor`]
//! - Stuck-sync detection via [`sync_monitor`]
//! - Serialized, bounded reconnects via [`reconnect`]
//! - Periodic reconciliation via [`health`]
//!
//! # Concurrency
//!
//! Each store's [`ConnectionRecord`] lives behind its own `RwLock`. Monitors,
//! the reconnect task and the health loop all mutate a record under that
//! lock and never hold it across a collaborator call. Background tasks keep
//! only a `Weak` reference to the manager, so dropping the last
//! [`StoreManager`] lets them wind down on their own.
//!
//! Lifecycle events are emitted after the record lock is released.

mod health;
mod network_monitor;
mod record;
mod reconnect;
mod sync_monitor;

pub use health::{HealthStatus, NetworkHealth, StoreHealth, SyncHealth};
pub use record::ConnectionInfo;

use crate::config::ManagerConfig;
use crate::error::{LifecycleError, Result};
use crate::events::{EventNotifier, LifecycleEvent, SubscriptionId};
use crate::metrics;
use crate::resilience::{bounded, panic_message};
use crate::status::ConnectionStatus;
use crate::store::{NoOpStoreFactory, StoreConfig, StoreFactory, StoreRef};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use futures::FutureExt;
use record::{ConnectionRecord, RecordSlot};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Outcome of [`StoreManager::initialize`].
#[derive(Debug, Default)]
pub struct InitializeReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, LifecycleError)>,
}

impl InitializeReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// State shared between the manager and its background tasks.
pub(crate) struct Shared<F: StoreFactory> {
    pub(crate) config: ManagerConfig,
    pub(crate) factory: Arc<F>,
    pub(crate) records: DashMap<String, RecordSlot>,
    pub(crate) events: Arc<EventNotifier>,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the set of live store handles, keyed by store id.
///
/// Cloning is cheap; clones share the same registry.
pub struct StoreManager<F: StoreFactory = NoOpStoreFactory> {
    shared: Arc<Shared<F>>,
}

impl<F: StoreFactory> Clone for StoreManager<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl StoreManager<NoOpStoreFactory> {
    /// Manager backed by [`NoOpStoreFactory`] (for testing/standalone).
    pub fn new(config: ManagerConfig) -> Result<Self> {
        Self::with_factory(config, Arc::new(NoOpStoreFactory))
    }
}

impl<F: StoreFactory> StoreManager<F> {
    /// Create a manager that opens stores through `factory`.
    ///
    /// No background work starts until the first store is added or
    /// [`initialize()`](Self::initialize) runs.
    pub fn with_factory(config: ManagerConfig, factory: Arc<F>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                factory,
                records: DashMap::new(),
                events: Arc::new(EventNotifier::new()),
                health_task: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// The lifecycle event notifier.
    pub fn events(&self) -> &Arc<EventNotifier> {
        &self.shared.events
    }

    /// Register a lifecycle event listener.
    ///
    /// Listeners run synchronously on the task that made the transition and
    /// must not block.
    pub fn subscribe<L>(&self, listener: L) -> SubscriptionId
    where
        L: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(listener)
    }

    /// Receive lifecycle events over a channel.
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<LifecycleEvent> {
        self.shared.events.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.events.unsubscribe(id)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Registry
    // ═══════════════════════════════════════════════════════════════════════

    /// Open and register a store, or return the already-registered handle.
    ///
    /// Starts the network and sync monitors for the new handle and the
    /// health loop if it is not running yet.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::StoreCreation`] or
    /// [`LifecycleError::Timeout`] if the factory fails, and
    /// [`LifecycleError::Internal`] if it panics. Nothing is registered in
    /// that case.
    pub async fn add_connection(&self, store_id: impl Into<String>, config: StoreConfig) -> Result<StoreRef> {
        let store_id = store_id.into();
        if let Some(existing) = self.get_connection(&store_id).await {
            debug!(store_id = %store_id, "Store already registered");
            return Ok(existing);
        }

        info!(
            store_id = %store_id,
            dashboard = %self.shared.config.dashboard(),
            "Opening store connection"
        );

        let handle = match self.shared.create_handle(&store_id, config.clone(), None).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(
                    store_id = %store_id,
                    dashboard = %self.shared.config.dashboard(),
                    error = %e,
                    "Failed to open store connection"
                );
                return Err(e);
            }
        };

        let slot: RecordSlot = Arc::new(RwLock::new(ConnectionRecord::new(
            store_id.clone(),
            Arc::clone(&handle),
            config,
        )));
        {
            let mut record = slot.write().await;
            self.shared.attach_monitors(&store_id, &slot, &mut record);
        }

        // A concurrent add for the same id may have won while we were
        // creating. Keep theirs and close ours.
        let winner = match self.shared.records.entry(store_id.clone()) {
            Entry::Occupied(entry) => Some(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&slot));
                None
            }
        };

        if let Some(winner) = winner {
            warn!(store_id = %store_id, "Concurrent add for store; discarding duplicate handle");
            self.shared.discard(&store_id, &slot).await;
            let existing = Arc::clone(&winner.read().await.handle);
            return Ok(existing);
        }

        metrics::set_managed_stores(self.shared.records.len());
        info!(store_id = %store_id, "Store connected");

        self.shared.ensure_health_loop().await;
        Ok(handle)
    }

    /// Unregister a store and close its handle.
    ///
    /// Cancels the pending reconnect and both monitors first. A failing
    /// shutdown is logged and swallowed. Unknown ids are a no-op.
    pub async fn remove_connection(&self, store_id: &str) {
        self.shared.remove(store_id).await;
    }

    /// Handle for `store_id`, if registered.
    pub async fn get_connection(&self, store_id: &str) -> Option<StoreRef> {
        let slot = self.shared.slot(store_id)?;
        let record = slot.read().await;
        Some(Arc::clone(&record.handle))
    }

    /// Every registered handle, keyed by store id.
    pub async fn get_all_connections(&self) -> HashMap<String, StoreRef> {
        let mut all = HashMap::new();
        for (store_id, slot) in self.shared.snapshot() {
            let handle = Arc::clone(&slot.read().await.handle);
            all.insert(store_id, handle);
        }
        all
    }

    /// Snapshot of the full record for `store_id`.
    pub async fn get_connection_info(&self, store_id: &str) -> Option<ConnectionInfo> {
        let slot = self.shared.slot(store_id)?;
        let info = slot.read().await.info();
        Some(info)
    }

    /// Record application activity on a store. Returns `false` for unknown ids.
    pub async fn update_activity(&self, store_id: &str) -> bool {
        let Some(slot) = self.shared.slot(store_id) else {
            return false;
        };
        slot.write().await.last_activity = Instant::now();
        true
    }

    /// Number of registered stores.
    pub fn connection_count(&self) -> usize {
        self.shared.records.len()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Open every store in `store_ids` with the default store config.
    ///
    /// See [`initialize_with`](Self::initialize_with).
    pub async fn initialize<I, S>(&self, store_ids: I) -> InitializeReport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let default = self.shared.config.default_store.clone();
        self.initialize_with(store_ids.into_iter().map(|id| (id.into(), default.clone())))
            .await
    }

    /// Open every `(store_id, config)` pair concurrently.
    ///
    /// All additions settle before this returns; one failing store does not
    /// abort the others. The health loop starts regardless of outcomes.
    pub async fn initialize_with<I>(&self, stores: I) -> InitializeReport
    where
        I: IntoIterator<Item = (String, StoreConfig)>,
    {
        let outcomes = join_all(stores.into_iter().map(|(store_id, config)| async move {
            let outcome = self.add_connection(store_id.clone(), config).await;
            (store_id, outcome)
        }))
        .await;

        let mut report = InitializeReport::default();
        for (store_id, outcome) in outcomes {
            match outcome {
                Ok(_) => report.succeeded.push(store_id),
                Err(e) => {
                    warn!(store_id = %store_id, error = %e, "Store failed to initialize");
                    report.failed.push((store_id, e));
                }
            }
        }

        self.shared.ensure_health_loop().await;
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Store manager initialized"
        );
        report
    }

    /// Stop the health loop, then remove and close every store.
    ///
    /// Individual shutdown failures are logged; the remaining stores are
    /// still closed.
    pub async fn shutdown(&self) {
        info!(stores = self.shared.records.len(), "Shutting down store manager");

        if let Some(task) = self.shared.health_task.lock().await.take() {
            task.abort();
        }

        let store_ids: Vec<String> = self.shared.snapshot().into_iter().map(|(id, _)| id).collect();
        let outcomes = join_all(store_ids.iter().map(|id| self.shared.remove(id))).await;
        let failures = outcomes.into_iter().filter(|clean| *clean == Some(false)).count();

        if failures > 0 {
            warn!(failures, "Store manager stopped with shutdown failures");
        } else {
            info!("Store manager stopped");
        }
    }

    /// Aggregate health over every registered store.
    ///
    /// Healthy when every store is `connected` and, where reachability is
    /// known, reachable. An empty registry is healthy.
    pub async fn get_health_status(&self) -> HealthStatus {
        self.shared.health_status().await
    }

    /// Whether the periodic health loop is running.
    pub async fn is_health_check_running(&self) -> bool {
        self.shared
            .health_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<Shared<F>> {
        &self.shared
    }
}

impl<F: StoreFactory> Drop for Shared<F> {
    fn drop(&mut self) {
        if let Some(task) = self.health_task.get_mut().take() {
            task.abort();
        }
        for entry in self.records.iter() {
            if let Ok(mut record) = entry.value().try_write() {
                record.cancel_reconnect();
                record.abort_monitors();
            }
        }
    }
}

impl<F: StoreFactory> Shared<F> {
    pub(crate) fn slot(&self, store_id: &str) -> Option<RecordSlot> {
        self.records.get(store_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Clone every slot out of the map so no shard guard is held across an await.
    pub(crate) fn snapshot(&self) -> Vec<(String, RecordSlot)> {
        self.records
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// Open a handle through the factory under the create timeout.
    ///
    /// A panicking factory becomes [`LifecycleError::Internal`], which is not
    /// retryable.
    pub(crate) async fn create_handle(
        &self,
        store_id: &str,
        config: StoreConfig,
        previous: Option<StoreConfig>,
    ) -> Result<StoreRef> {
        let create = AssertUnwindSafe(self.factory.create(store_id.to_string(), config, previous))
            .catch_unwind()
            .map(|outcome| match outcome {
                Ok(created) => created.map(Ok),
                Err(panic) => Ok(Err(LifecycleError::Internal(format!(
                    "store factory panicked while creating {store_id}: {}",
                    panic_message(panic.as_ref())
                )))),
            });

        bounded(
            store_id,
            "create",
            self.config.timeouts.create_timeout_duration(),
            create,
            |e| LifecycleError::creation(store_id, e),
        )
        .await?
    }

    /// Close a handle under the shutdown timeout. Failures are logged and
    /// counted, never propagated. Returns whether the close was clean.
    pub(crate) async fn release_handle(&self, store_id: &str, handle: StoreRef) -> bool {
        let outcome = bounded(
            store_id,
            "shutdown",
            self.config.timeouts.shutdown_timeout_duration(),
            self.factory.shutdown(handle),
            |e| LifecycleError::shutdown(store_id, e),
        )
        .await;

        match outcome {
            Ok(()) => true,
            Err(e) => {
                warn!(store_id = %store_id, error = %e, "Store shutdown failed");
                metrics::record_shutdown_failure(store_id);
                false
            }
        }
    }

    /// Remove and close one store. `None` if it was not registered,
    /// otherwise whether its shutdown was clean.
    pub(crate) async fn remove(&self, store_id: &str) -> Option<bool> {
        let Some((_, slot)) = self.records.remove(store_id) else {
            debug!(store_id = %store_id, "Remove for unknown store ignored");
            return None;
        };

        let handle = {
            let mut record = slot.write().await;
            record.cancel_reconnect();
            record.abort_monitors();
            (!record.handle_released).then(|| Arc::clone(&record.handle))
        };

        let clean = match handle {
            Some(handle) => self.release_handle(store_id, handle).await,
            None => {
                debug!(store_id = %store_id, "Handle already closed by reconnect");
                true
            }
        };
        metrics::set_managed_stores(self.records.len());
        info!(store_id = %store_id, clean, "Store removed");
        Some(clean)
    }

    /// Tear down a slot that lost a concurrent add and close its handle.
    pub(crate) async fn discard(&self, store_id: &str, slot: &RecordSlot) -> bool {
        let handle = {
            let mut record = slot.write().await;
            record.cancel_reconnect();
            record.abort_monitors();
            Arc::clone(&record.handle)
        };
        self.release_handle(store_id, handle).await
    }

    /// Start the monitors for the record's current handle.
    ///
    /// Must be called with the record's write lock held, so the generation
    /// the monitors are tagged with is the one they will be checked against.
    pub(crate) fn attach_monitors(self: &Arc<Self>, store_id: &str, slot: &RecordSlot, record: &mut ConnectionRecord) {
        let generation = record.generation;

        match record.handle.reachability() {
            Some(channel) => record.monitors.push(tokio::spawn(network_monitor::run(
                Arc::downgrade(self),
                store_id.to_string(),
                Arc::clone(slot),
                generation,
                channel,
            ))),
            None => debug!(store_id = %store_id, "Store has no reachability channel"),
        }

        match record.handle.sync_progress() {
            Some(channel) => record.monitors.push(tokio::spawn(sync_monitor::run(
                Arc::downgrade(self),
                store_id.to_string(),
                Arc::clone(slot),
                generation,
                channel,
            ))),
            None => debug!(store_id = %store_id, "Store has no sync progress channel"),
        }
    }

    /// Mark a store disconnected. Returns the event to emit once the record
    /// lock is released, or `None` if it was not connected.
    pub(crate) fn mark_disconnected(&self, record: &mut ConnectionRecord) -> Option<LifecycleEvent> {
        if record.status != ConnectionStatus::Connected {
            return None;
        }
        record.set_status(ConnectionStatus::Disconnected);
        Some(LifecycleEvent::Disconnected {
            store_id: record.store_id.clone(),
        })
    }

    pub(crate) fn emit_all(&self, events: impl IntoIterator<Item = LifecycleEvent>) {
        for event in events {
            self.events.emit(event);
        }
    }
}
