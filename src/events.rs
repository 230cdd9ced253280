//! Lifecycle event notification.
//!
//! A small synchronous publish/subscribe surface. Listeners registered at the
//! time of emission are each called once, in registration order, on the task
//! that performed the transition. A panicking listener is logged and skipped;
//! it never affects the other listeners or the transition itself.
//!
//! ```rust
//! use store_lifecycle::events::{EventNotifier, LifecycleEvent};
//!
//! let notifier = EventNotifier::new();
//! let id = notifier.subscribe(|event: &LifecycleEvent| {
//!     if let LifecycleEvent::Reconnected { store_id, .. } = event {
//!         println!("re-subscribe to {store_id}");
//!     }
//! });
//! notifier.unsubscribe(id);
//! ```

use crate::metrics;
use crate::store::StoreRef;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::warn;

/// A lifecycle transition published to subscribers.
#[derive(Clone)]
pub enum LifecycleEvent {
    /// The store's handle was replaced. Subscribers holding the old handle
    /// must switch to `handle`.
    Reconnected { store_id: String, handle: StoreRef },
    /// The store was marked disconnected.
    Disconnected { store_id: String },
}

impl LifecycleEvent {
    pub fn store_id(&self) -> &str {
        match self {
            LifecycleEvent::Reconnected { store_id, .. } | LifecycleEvent::Disconnected { store_id } => store_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::Reconnected { .. } => "connectionReconnected",
            LifecycleEvent::Disconnected { .. } => "connectionDisconnected",
        }
    }
}

impl std::fmt::Debug for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(self.kind()).field("store_id", &self.store_id()).finish()
    }
}

/// Handle returned by [`EventNotifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Fan-out of lifecycle events to registered listeners.
#[derive(Default)]
pub struct EventNotifier {
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every event kind.
    pub fn subscribe<L>(&self, listener: L) -> SubscriptionId
    where
        L: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, Arc::new(listener)));
        id
    }

    /// Receive events over an unbounded channel instead of a callback.
    ///
    /// The subscription is dropped automatically at the next emission after
    /// the receiver goes away.
    pub fn subscribe_channel(self: &Arc<Self>) -> mpsc::UnboundedReceiver<LifecycleEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let notifier = Arc::downgrade(self);
        let slot: Arc<RwLock<Option<SubscriptionId>>> = Arc::new(RwLock::new(None));
        let slot_in_listener = Arc::clone(&slot);

        let id = self.subscribe(move |event| {
            if tx.send(event.clone()).is_err() {
                let own_id = *slot_in_listener.read().unwrap_or_else(|p| p.into_inner());
                if let (Some(notifier), Some(own_id)) = (notifier.upgrade(), own_id) {
                    notifier.unsubscribe(own_id);
                }
            }
        });
        *slot.write().unwrap_or_else(|p| p.into_inner()) = Some(id);
        rx
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|p| p.into_inner());
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Call every listener registered right now.
    pub fn emit(&self, event: LifecycleEvent) {
        // Snapshot so listeners may (un)subscribe without deadlocking.
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        metrics::record_event_emitted(event.kind());

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| (*listener)(&event))).is_err() {
                warn!(
                    store_id = %event.store_id(),
                    event = event.kind(),
                    "Lifecycle event listener panicked"
                );
            }
        }
    }
}
