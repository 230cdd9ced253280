// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the store lifecycle manager.
//!
//! Errors carry the store id they relate to so that log lines and callers
//! can attribute a failure without extra context.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `StoreCreation` | Yes | Factory failed to open a store connection |
//! | `StoreShutdown` | Yes | Graceful close of a store handle failed |
//! | `Channel` | Yes | A reachability/progress read failed or its feed ended |
//! | `Timeout` | Yes | A collaborator call did not finish in time |
//! | `Config` | No | Configuration invalid |
//! | `Internal` | No | Unexpected internal error (a panicking factory or health pass) |
//!
//! # Retry Behavior
//!
//! Only errors surfaced to direct callers (`add_connection`) propagate.
//! Everything inside the managed lifecycle is logged and turned into a state
//! change instead. A reconnect attempt that fails with a non-retryable error
//! (see [`LifecycleError::is_retryable()`]) moves the store straight to
//! `error` without spending the rest of its budget.

use crate::store::StoreError;
use thiserror::Error;

/// Result type alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Errors that can occur while managing store connections.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// The connection factory could not create a store handle.
    ///
    /// Propagated from `add_connection`; during a scheduled reconnect it is
    /// caught and drives the retry/exhaustion transition instead.
    #[error("Store creation error ({store_id}): {message}")]
    StoreCreation {
        store_id: String,
        message: String,
        #[source]
        source: Option<StoreError>,
    },

    /// Graceful shutdown of a store handle failed.
    ///
    /// Never prevents removal of the record.
    #[error("Store shutdown error ({store_id}): {message}")]
    StoreShutdown { store_id: String, message: String },

    /// A monitoring channel failed (read error or feed ended).
    ///
    /// Treated as "monitoring unavailable", not as a connection failure.
    #[error("Channel error ({store_id}/{channel}): {message}")]
    Channel {
        store_id: String,
        channel: &'static str,
        message: String,
    },

    /// A collaborator call exceeded its configured timeout.
    #[error("Timed out ({store_id}): {operation} did not finish within {timeout_ms}ms")]
    Timeout {
        store_id: String,
        operation: &'static str,
        timeout_ms: u64,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LifecycleError {
    /// Wrap a factory failure with the store it was creating.
    pub fn creation(store_id: impl Into<String>, source: StoreError) -> Self {
        Self::StoreCreation {
            store_id: store_id.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Wrap a shutdown failure with the store it was closing.
    pub fn shutdown(store_id: impl Into<String>, source: StoreError) -> Self {
        Self::StoreShutdown {
            store_id: store_id.into(),
            message: source.to_string(),
        }
    }

    /// Wrap a channel failure.
    pub fn channel(store_id: impl Into<String>, channel: &'static str, message: impl Into<String>) -> Self {
        Self::Channel {
            store_id: store_id.into(),
            channel,
            message: message.into(),
        }
    }

    /// The store this error relates to, if any.
    pub fn store_id(&self) -> Option<&str> {
        match self {
            Self::StoreCreation { store_id, .. }
            | Self::StoreShutdown { store_id, .. }
            | Self::Channel { store_id, .. }
            | Self::Timeout { store_id, .. } => Some(store_id),
            Self::Config(_) | Self::Internal(_) => None,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StoreCreation { .. } => true,
            Self::StoreShutdown { .. } => true,
            Self::Channel { .. } => true,
            Self::Timeout { .. } => true,
            Self::Config(_) => false,
            Self::Internal(_) => false,
        }
    }
}
