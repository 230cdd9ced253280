// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Chaos tests: simulate failures and verify graceful degradation.
//!
//! These tests verify the manager handles misbehaving collaborators and
//! subscribers without panics, deadlocks, or leaked reconnects.
//!
//! Run with: cargo test --test chaos_tests -- --nocapture

mod common;

use common::{init_tracing, settle, MockStoreFactory};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use store_lifecycle::{ConnectionStatus, LifecycleError, LifecycleEvent, ManagerConfig, StoreConfig, StoreManager};
use tokio::time::sleep;

fn manager() -> (StoreManager<MockStoreFactory>, Arc<MockStoreFactory>) {
    init_tracing();
    let factory = Arc::new(MockStoreFactory::new());
    let manager = StoreManager::with_factory(ManagerConfig::for_testing(), Arc::clone(&factory)).unwrap();
    (manager, factory)
}

// =============================================================================
// Misbehaving subscribers
// =============================================================================

/// Test: A panicking listener neither blocks other listeners nor the reconnect
#[tokio::test(start_paused = true)]
async fn panicking_listener_is_isolated() {
    let (manager, factory) = manager();
    let reconnected = Arc::new(AtomicUsize::new(0));

    manager.subscribe(|_| panic!("subscriber bug"));
    let counted = Arc::clone(&reconnected);
    manager.subscribe(move |event| {
        if matches!(event, LifecycleEvent::Reconnected { .. }) {
            counted.fetch_add(1, Ordering::SeqCst);
        }
    });

    manager.add_connection("board-1", StoreConfig::default()).await.unwrap();
    settle().await;
    factory.latest("board-1").unwrap().set_reachable(false);
    settle().await;
    sleep(Duration::from_millis(1500)).await;

    assert_eq!(reconnected.load(Ordering::SeqCst), 1);
    let info = manager.get_connection_info("board-1").await.unwrap();
    assert_eq!(info.status, ConnectionStatus::Connected);
}

/// Test: A listener that calls back into the notifier does not deadlock
#[tokio::test(start_paused = true)]
async fn reentrant_listener_does_not_deadlock() {
    let (manager, factory) = manager();
    let events = Arc::clone(manager.events());

    manager.subscribe(move |_| {
        // Subscribing and unsubscribing from inside emit() must be safe.
        let id = events.subscribe(|_| {});
        events.unsubscribe(id);
    });

    manager.add_connection("board-1", StoreConfig::default()).await.unwrap();
    settle().await;
    factory.latest("board-1").unwrap().set_reachable(false);
    settle().await;

    assert_eq!(
        manager.get_connection_info("board-1").await.unwrap().status,
        ConnectionStatus::Disconnected
    );
}

// =============================================================================
// Misbehaving factory
// =============================================================================

/// Test: A failing shutdown of the dead handle does not stop the reconnect
#[tokio::test(start_paused = true)]
async fn failing_shutdown_does_not_block_reconnect() {
    let (manager, factory) = manager();
    factory.set_fail_shutdowns(true);

    manager.add_connection("chat", StoreConfig::default()).await.unwrap();
    settle().await;
    factory.latest("chat").unwrap().set_reachable(false);
    settle().await;
    sleep(Duration::from_millis(1500)).await;

    assert_eq!(factory.shutdown_count(), 1);
    assert_eq!(factory.create_count("chat"), 2);
    assert_eq!(
        manager.get_connection_info("chat").await.unwrap().status,
        ConnectionStatus::Connected
    );
}

/// Test: A failing shutdown never prevents removal
#[tokio::test(start_paused = true)]
async fn failing_shutdown_still_removes() {
    let (manager, factory) = manager();
    factory.set_fail_shutdowns(true);

    manager.initialize(["a", "b", "c"]).await;
    manager.shutdown().await;

    assert_eq!(factory.shutdown_count(), 3);
    assert_eq!(manager.connection_count(), 0);
}

/// Test: Removing a store while its reconnect is mid-create leaves no trace
#[tokio::test(start_paused = true)]
async fn remove_during_inflight_reconnect() {
    let (manager, factory) = manager();
    let mut events = manager.subscribe_channel();

    manager.add_connection("docs", StoreConfig::default()).await.unwrap();
    settle().await;
    factory.set_create_delay(Duration::from_millis(500));
    factory.latest("docs").unwrap().set_reachable(false);
    settle().await;

    // Timer fired, create in flight.
    sleep(Duration::from_millis(1200)).await;
    assert_eq!(
        manager.get_connection_info("docs").await.unwrap().status,
        ConnectionStatus::Connecting
    );

    manager.remove_connection("docs").await;
    sleep(Duration::from_secs(5)).await;

    assert!(manager.get_connection("docs").await.is_none());
    assert_eq!(factory.create_count("docs"), 1);
    assert_eq!(factory.shutdown_count(), 1, "dead handle closed exactly once");
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, LifecycleEvent::Reconnected { .. }));
    }
}

/// Test: Hung creates are bounded by the create timeout and count as failures
#[tokio::test(start_paused = true)]
async fn slow_creates_time_out_during_reconnect() {
    let (manager, factory) = manager();

    manager.add_connection("users", StoreConfig::default()).await.unwrap();
    settle().await;
    factory.set_create_delay(Duration::from_secs(60));
    factory.latest("users").unwrap().set_reachable(false);
    settle().await;

    // 3 attempts, each 1s interval + 1s create timeout.
    sleep(Duration::from_secs(10)).await;

    let info = manager.get_connection_info("users").await.unwrap();
    assert_eq!(info.status, ConnectionStatus::Error);
    assert_eq!(info.reconnect_attempts, 3);
    assert_eq!(info.error_count, 3);
}

/// Test: A panicking factory fails the add instead of unwinding into the caller
#[tokio::test(start_paused = true)]
async fn panicking_factory_fails_add() {
    let (manager, factory) = manager();
    factory.set_panic_on_create(true);

    let result = manager.add_connection("users", StoreConfig::default()).await;

    assert!(matches!(result, Err(LifecycleError::Internal(_))));
    assert_eq!(manager.connection_count(), 0);
}

/// Test: A panicking factory during reconnect ends in error without spending the budget
#[tokio::test(start_paused = true)]
async fn panicking_factory_during_reconnect_is_fatal() {
    let (manager, factory) = manager();
    let mut events = manager.subscribe_channel();

    manager.add_connection("users", StoreConfig::default()).await.unwrap();
    settle().await;
    factory.set_panic_on_create(true);
    factory.latest("users").unwrap().set_reachable(false);
    settle().await;

    sleep(Duration::from_millis(1500)).await;

    let info = manager.get_connection_info("users").await.unwrap();
    assert_eq!(info.status, ConnectionStatus::Error);
    assert_eq!(info.reconnect_attempts, 1);
    assert!(!info.reconnect_pending);

    // Nothing further is attempted once the factory proved broken.
    factory.set_panic_on_create(false);
    sleep(Duration::from_secs(30)).await;
    assert_eq!(factory.create_count("users"), 1);
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, LifecycleEvent::Reconnected { .. }));
    }
}

// =============================================================================
// Concurrency
// =============================================================================

/// Test: Concurrent adds for the same id register exactly one handle
#[tokio::test(start_paused = true)]
async fn concurrent_adds_register_once() {
    let (manager, _factory) = manager();

    let (a, b) = tokio::join!(
        manager.add_connection("users", StoreConfig::default()),
        manager.add_connection("users", StoreConfig::default()),
    );

    let a = a.unwrap();
    let b = b.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(manager.connection_count(), 1);
}

/// Test: Shutdown while reconnects are pending cancels all of them
#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_reconnects() {
    let (manager, factory) = manager();
    manager.initialize(["a", "b", "c"]).await;
    settle().await;

    for id in ["a", "b", "c"] {
        factory.latest(id).unwrap().set_reachable(false);
    }
    settle().await;

    manager.shutdown().await;
    sleep(Duration::from_secs(10)).await;

    for id in ["a", "b", "c"] {
        assert_eq!(factory.create_count(id), 1);
    }
}

/// Test: Dropping the manager lets background tasks wind down
#[tokio::test(start_paused = true)]
async fn dropped_manager_stops_reconnecting() {
    let (manager, factory) = manager();
    manager.add_connection("a", StoreConfig::default()).await.unwrap();
    settle().await;
    factory.latest("a").unwrap().set_reachable(false);
    settle().await;

    drop(manager);
    sleep(Duration::from_secs(10)).await;

    assert_eq!(factory.create_count("a"), 1);
}
