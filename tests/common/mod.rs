//! Shared test utilities for lifecycle and chaos tests.
//!
//! This module provides:
//! - Mock StoreFactory recording every created handle
//! - Mock StoreHandle with controllable reachability and sync progress
//! - Tracing setup and paused-clock helpers

pub mod mock_store;

pub use mock_store::*;

use std::time::Duration;

/// Install a test subscriber once. Honors `RUST_LOG`.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("store_lifecycle=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Let spawned monitors and timers run. Under a paused clock this advances
/// time by one millisecond once every runnable task is idle.
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
