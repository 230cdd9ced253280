//! Mock StoreFactory / StoreHandle for testing.
//!
//! Every handle the factory opens is recorded so tests can drive its
//! reachability and sync-progress feeds. Creation and shutdown failures,
//! plus slow creation, can be injected.

use store_lifecycle::store::BoxFuture;
use store_lifecycle::{
    ObservationChannel, Reachability, StoreConfig, StoreError, StoreFactory, StoreHandle, StoreRef, SyncProgress,
    WatchChannel,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// A store handle whose observation channels are driven by the test.
pub struct MockStore {
    pub store_id: String,
    pub config: StoreConfig,
    pub previous: Option<StoreConfig>,
    reachability: Arc<WatchChannel<Reachability>>,
    reachability_tx: watch::Sender<Reachability>,
    progress: Arc<WatchChannel<SyncProgress>>,
    progress_tx: watch::Sender<SyncProgress>,
}

impl MockStore {
    fn new(store_id: String, config: StoreConfig, previous: Option<StoreConfig>, reachable: bool) -> Self {
        let (reachability, reachability_tx) = WatchChannel::new(Reachability {
            is_connected: reachable,
        });
        let (progress, progress_tx) = WatchChannel::new(SyncProgress::new(0, "genesis", "genesis"));
        Self {
            store_id,
            config,
            previous,
            reachability,
            reachability_tx,
            progress,
            progress_tx,
        }
    }

    /// Publish a reachability change on the feed.
    pub fn set_reachable(&self, is_connected: bool) {
        self.reachability_tx.send_replace(Reachability { is_connected });
    }

    /// Publish a replication-progress update on the feed.
    pub fn set_progress(&self, pending_count: u64, local_head: &str, upstream_head: &str) {
        self.progress_tx
            .send_replace(SyncProgress::new(pending_count, local_head, upstream_head));
    }
}

impl StoreHandle for MockStore {
    fn reachability(&self) -> Option<Arc<dyn ObservationChannel<Reachability>>> {
        Some(self.reachability.clone())
    }

    fn sync_progress(&self) -> Option<Arc<dyn ObservationChannel<SyncProgress>>> {
        Some(self.progress.clone())
    }
}

/// Factory that records every handle it opens.
///
/// # Example
/// ```rust,ignore
/// let factory = Arc::new(MockStoreFactory::new());
/// let manager = StoreManager::with_factory(config, factory.clone())?;
/// manager.add_connection("board-1", StoreConfig::default()).await?;
/// factory.latest("board-1").unwrap().set_reachable(false);
/// ```
pub struct MockStoreFactory {
    created: Mutex<HashMap<String, Vec<Arc<MockStore>>>>,
    failing_creates: AtomicU32,
    create_delay: Mutex<Option<Duration>>,
    fail_shutdowns: AtomicBool,
    shutdowns: AtomicUsize,
    initially_reachable: AtomicBool,
    panic_on_create: AtomicBool,
}

impl Default for MockStoreFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStoreFactory {
    pub fn new() -> Self {
        Self {
            created: Mutex::new(HashMap::new()),
            failing_creates: AtomicU32::new(0),
            create_delay: Mutex::new(None),
            fail_shutdowns: AtomicBool::new(false),
            shutdowns: AtomicUsize::new(0),
            initially_reachable: AtomicBool::new(true),
            panic_on_create: AtomicBool::new(false),
        }
    }

    /// Fail the next `n` create calls.
    pub fn fail_next_creates(&self, n: u32) {
        self.failing_creates.store(n, Ordering::SeqCst);
    }

    /// Make every create call take `delay` before resolving.
    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = Some(delay);
    }

    /// Make create calls panic instead of returning.
    pub fn set_panic_on_create(&self, panic: bool) {
        self.panic_on_create.store(panic, Ordering::SeqCst);
    }

    pub fn set_fail_shutdowns(&self, fail: bool) {
        self.fail_shutdowns.store(fail, Ordering::SeqCst);
    }

    /// Reachability new handles start with.
    pub fn set_initially_reachable(&self, reachable: bool) {
        self.initially_reachable.store(reachable, Ordering::SeqCst);
    }

    /// Most recently opened handle for `store_id`.
    pub fn latest(&self, store_id: &str) -> Option<Arc<MockStore>> {
        self.created.lock().unwrap().get(store_id).and_then(|v| v.last().cloned())
    }

    /// Successful create calls for `store_id`.
    pub fn create_count(&self, store_id: &str) -> usize {
        self.created.lock().unwrap().get(store_id).map_or(0, |v| v.len())
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl StoreFactory for MockStoreFactory {
    fn create(&self, store_id: String, config: StoreConfig, previous: Option<StoreConfig>) -> BoxFuture<'_, StoreRef> {
        let delay = *self.create_delay.lock().unwrap();
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.panic_on_create.load(Ordering::SeqCst) {
                panic!("injected create panic for {store_id}");
            }

            let should_fail = self
                .failing_creates
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if should_fail {
                return Err(StoreError(format!("injected create failure for {store_id}")));
            }

            let reachable = self.initially_reachable.load(Ordering::SeqCst);
            let store = Arc::new(MockStore::new(store_id.clone(), config, previous, reachable));
            self.created
                .lock()
                .unwrap()
                .entry(store_id)
                .or_default()
                .push(Arc::clone(&store));
            Ok(store as StoreRef)
        })
    }

    fn shutdown(&self, _handle: StoreRef) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            if self.fail_shutdowns.load(Ordering::SeqCst) {
                return Err(StoreError("injected shutdown failure".to_string()));
            }
            Ok(())
        })
    }
}
