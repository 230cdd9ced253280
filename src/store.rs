// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Store integration traits.
//!
//! Defines what the lifecycle manager needs from the sync backend:
//!
//! - a [`StoreFactory`] that opens and closes store handles, and
//! - a [`StoreHandle`] exposing two optional observation channels
//!   (reachability and replication progress).
//!
//! The manager never talks to the sync backend itself. It only watches the
//! channels a handle exposes and asks the factory for a fresh handle when the
//! current one looks dead.
//!
//! # Example
//!
//! ```rust,no_run
//! use store_lifecycle::store::{BoxFuture, StoreConfig, StoreFactory, StoreRef, NoOpStore};
//! use std::sync::Arc;
//!
//! struct MyFactory;
//!
//! impl StoreFactory for MyFactory {
//!     fn create(
//!         &self,
//!         store_id: String,
//!         _config: StoreConfig,
//!         _previous: Option<StoreConfig>,
//!     ) -> BoxFuture<'_, StoreRef> {
//!         Box::pin(async move { Ok(Arc::new(NoOpStore::new(store_id)) as StoreRef) })
//!     }
//!
//!     fn shutdown(&self, _handle: StoreRef) -> BoxFuture<'_, ()> {
//!         Box::pin(async { Ok(()) })
//!     }
//! }
//! ```

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;

/// Result type for store collaborator operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Shared, type-erased store handle.
pub type StoreRef = Arc<dyn StoreHandle>;

/// Simplified error for store operations.
#[derive(Debug, Clone)]
pub struct StoreError(pub String);

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StoreError {}

/// Immutable configuration snapshot used to (re)create a store.
///
/// Stored with the connection record and handed back to the factory on
/// every reconnect, together with the previous snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Sync backend endpoint, if the store syncs upstream.
    #[serde(default)]
    pub sync_url: Option<String>,

    /// Credential presented to the sync backend.
    #[serde(default, skip_serializing)]
    pub auth_token: Option<String>,

    /// Local persistence directory.
    #[serde(default)]
    pub storage_dir: Option<String>,

    /// Free-form labels passed through to the factory.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl StoreConfig {
    /// Config pointing at a sync backend.
    pub fn with_sync_url(url: impl Into<String>) -> Self {
        Self {
            sync_url: Some(url.into()),
            ..Default::default()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Observations
// ═══════════════════════════════════════════════════════════════════════════════

/// One value read from a reachability channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reachability {
    pub is_connected: bool,
}

impl Reachability {
    pub fn online() -> Self {
        Self { is_connected: true }
    }

    pub fn offline() -> Self {
        Self { is_connected: false }
    }
}

/// One value read from a replication-progress channel.
///
/// Heads are opaque and only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncProgress {
    pub pending_count: u64,
    pub local_head: String,
    pub upstream_head: String,
}

impl SyncProgress {
    pub fn new(pending_count: u64, local_head: impl Into<String>, upstream_head: impl Into<String>) -> Self {
        Self {
            pending_count,
            local_head: local_head.into(),
            upstream_head: upstream_head.into(),
        }
    }
}

/// An observable value: a one-shot read plus a continuous change feed.
///
/// Either half may be unsupported by a given store. `subscribe()` returning
/// `None` means there is no feed; `current()` failing means the one-shot read
/// is unavailable.
pub trait ObservationChannel<T>: Send + Sync {
    /// Read the current value.
    fn current(&self) -> BoxFuture<'_, T>;

    /// Subscribe to future changes.
    fn subscribe(&self) -> Option<BoxStream<'static, T>>;
}

/// A live connection to a data store.
pub trait StoreHandle: Send + Sync + 'static {
    /// Reachability channel, if the store exposes one.
    fn reachability(&self) -> Option<Arc<dyn ObservationChannel<Reachability>>> {
        None
    }

    /// Replication-progress channel, if the store exposes one.
    fn sync_progress(&self) -> Option<Arc<dyn ObservationChannel<SyncProgress>>> {
        None
    }
}

/// Opens and closes store handles.
///
/// The integrating application provides an implementation; tests use mocks.
pub trait StoreFactory: Send + Sync + 'static {
    /// Open a new store handle.
    ///
    /// `previous` carries the config of the handle being replaced during a
    /// reconnect so settings can be preserved.
    fn create(
        &self,
        store_id: String,
        config: StoreConfig,
        previous: Option<StoreConfig>,
    ) -> BoxFuture<'_, StoreRef>;

    /// Gracefully close a store handle.
    fn shutdown(&self, handle: StoreRef) -> BoxFuture<'_, ()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// WatchChannel: ObservationChannel over tokio::sync::watch
// ═══════════════════════════════════════════════════════════════════════════════

/// An [`ObservationChannel`] backed by a `tokio::sync::watch` channel.
///
/// The feed yields every value published after subscription. Values
/// published faster than they are consumed are coalesced to the latest.
pub struct WatchChannel<T> {
    rx: watch::Receiver<T>,
}

impl<T> WatchChannel<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a channel and the sender used to publish into it.
    pub fn new(initial: T) -> (Arc<Self>, watch::Sender<T>) {
        let (tx, rx) = watch::channel(initial);
        (Arc::new(Self { rx }), tx)
    }
}

impl<T> ObservationChannel<T> for WatchChannel<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn current(&self) -> BoxFuture<'_, T> {
        let value = self.rx.borrow().clone();
        Box::pin(async move { Ok(value) })
    }

    fn subscribe(&self) -> Option<BoxStream<'static, T>> {
        let mut rx = self.rx.clone();
        rx.mark_unchanged();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.changed().await.ok()?;
            let value = rx.borrow_and_update().clone();
            Some((value, rx))
        });
        Some(Box::pin(stream))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// No-op implementations
// ═══════════════════════════════════════════════════════════════════════════════

/// A store handle with no observation channels.
///
/// Monitoring is skipped for such stores; they stay `connected` until removed.
#[derive(Debug, Clone)]
pub struct NoOpStore {
    store_id: String,
}

impl NoOpStore {
    pub fn new(store_id: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
        }
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }
}

impl StoreHandle for NoOpStore {}

/// A factory producing [`NoOpStore`] handles (for testing/standalone mode).
#[derive(Debug, Clone, Default)]
pub struct NoOpStoreFactory;

impl StoreFactory for NoOpStoreFactory {
    fn create(
        &self,
        store_id: String,
        _config: StoreConfig,
        _previous: Option<StoreConfig>,
    ) -> BoxFuture<'_, StoreRef> {
        Box::pin(async move {
            tracing::debug!(store_id = %store_id, "NoOp: creating store");
            Ok(Arc::new(NoOpStore::new(store_id)) as StoreRef)
        })
    }

    fn shutdown(&self, _handle: StoreRef) -> BoxFuture<'_, ()> {
        Box::pin(async {
            tracing::debug!("NoOp: shutting down store");
            Ok(())
        })
    }
}
