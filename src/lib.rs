//! # Store Lifecycle
//!
//! Keeps a set of local-first data store connections alive for the lifetime
//! of an application.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                              StoreManager                                 │
//! │                                                                           │
//! │  ┌──────────────┐   ┌──────────────────┐    ┌─────────────────────────┐   │
//! │  │ StoreFactory │──►│ ConnectionRecord │◄───│ Network / Sync monitors │   │
//! │  │ (create,     │   │ (per store id)   │    │ (per handle)            │   │
//! │  │  shutdown)   │   └──────────────────┘    └─────────────────────────┘   │
//! │  └──────────────┘      ▲           │                     │                │
//! │         ▲              │           ▼                     ▼                │
//! │         │     ┌──────────────┐  ┌──────────────────────────────────┐      │
//! │         └─────│ Reconnect    │◄─│ Health loop (periodic fallback)  │      │
//! │               │ (one per id) │  └──────────────────────────────────┘      │
//! │               └──────────────┘                                            │
//! │                      │                                                    │
//! │                      ▼                                                    │
//! │               EventNotifier ──► connectionReconnected / Disconnected      │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure Detection
//!
//! 1. **Reachability**: the store's reachability feed flips to offline
//! 2. **Stuck sync**: pending work sees no upstream progress past a threshold
//! 3. **Fallback**: the health loop finds a store unreachable for too long
//!
//! Each path marks the store `disconnected` and schedules a single, bounded,
//! flat-interval reconnect that swaps in a fresh handle.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use store_lifecycle::{LifecycleEvent, ManagerConfig, StoreManager};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = StoreManager::new(ManagerConfig::default()).expect("valid config");
//!
//!     manager.subscribe(|event| {
//!         if let LifecycleEvent::Reconnected { store_id, .. } = event {
//!             println!("{store_id} has a new handle");
//!         }
//!     });
//!
//!     let report = manager.initialize(["users", "chat", "docs"]).await;
//!     assert!(report.all_succeeded());
//!
//!     manager.shutdown().await;
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod metrics;
pub mod resilience;
pub mod status;
pub mod store;

// Re-exports for convenience
pub use config::{HealthCheckConfig, ManagerConfig, ReconnectConfig, SyncWatchConfig, TimeoutConfig};
pub use error::{LifecycleError, Result};
pub use events::{EventNotifier, LifecycleEvent, SubscriptionId};
pub use manager::{ConnectionInfo, HealthStatus, InitializeReport, StoreHealth, StoreManager};
pub use resilience::ReconnectPolicy;
pub use status::{ConnectionStatus, NetworkStatus, SyncStatus};
pub use store::{
    NoOpStore, NoOpStoreFactory, ObservationChannel, Reachability, StoreConfig, StoreError, StoreFactory,
    StoreHandle, StoreRef, SyncProgress, WatchChannel,
};
