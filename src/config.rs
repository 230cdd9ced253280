//! Configuration for the store lifecycle manager.
//!
//! Configuration is passed to [`StoreManager::new()`](crate::StoreManager::new)
//! and can be constructed programmatically or deserialized from YAML/JSON.
//!
//! # Configuration Structure
//!
//! ```text
//! ManagerConfig
//! ├── reconnect: ReconnectConfig   # Flat-interval bounded retry
//! ├── health: HealthCheckConfig    # Periodic reconciliation pass
//! ├── sync: SyncWatchConfig        # Stuck-replication detection
//! ├── timeouts: TimeoutConfig      # Bounds on factory create/shutdown
//! ├── dashboard_url: Option<String>
//! └── default_store: StoreConfig   # Used by initialize(ids)
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "reconnect": { "interval_ms": 5000, "max_attempts": 3 },
//!   "health": { "interval_sec": 30, "fallback_threshold_sec": 120 },
//!   "sync": { "stuck_threshold_sec": 60 },
//!   "timeouts": { "create_timeout": "10s", "shutdown_timeout": "5s" },
//!   "dashboard_url": "https://grafana.example.com/d/stores"
//! }
//! ```

use crate::error::{LifecycleError, Result};
use crate::resilience::ReconnectPolicy;
use crate::store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `StoreManager::new()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    #[serde(default)]
    pub health: HealthCheckConfig,

    #[serde(default)]
    pub sync: SyncWatchConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Incident dashboard attached to lifecycle log records.
    #[serde(default)]
    pub dashboard_url: Option<String>,

    /// Store config used for ids passed to `initialize()`.
    #[serde(default)]
    pub default_store: StoreConfig,
}

impl ManagerConfig {
    /// Short timings for tests. Health checks are effectively off
    /// (one hour period) so timer-driven tests stay deterministic.
    pub fn for_testing() -> Self {
        Self {
            reconnect: ReconnectConfig {
                interval_ms: 1000,
                max_attempts: 3,
            },
            health: HealthCheckConfig {
                interval_sec: 3600,
                fallback_threshold_sec: 120,
            },
            sync: SyncWatchConfig::default(),
            timeouts: TimeoutConfig {
                create_timeout: "1s".to_string(),
                shutdown_timeout: "1s".to_string(),
            },
            dashboard_url: None,
            default_store: StoreConfig::default(),
        }
    }

    /// Reject settings the lifecycle cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.reconnect.max_attempts == 0 {
            return Err(LifecycleError::Config(
                "reconnect.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.reconnect.interval_ms == 0 {
            return Err(LifecycleError::Config(
                "reconnect.interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.health.interval_sec == 0 {
            return Err(LifecycleError::Config(
                "health.interval_sec must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Dashboard reference for log records ("-" when not configured).
    pub fn dashboard(&self) -> &str {
        self.dashboard_url.as_deref().unwrap_or("-")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ReconnectConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Reconnect scheduling. Retries use a flat interval, not exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before each reconnect attempt (milliseconds).
    #[serde(default = "default_reconnect_interval_ms")]
    pub interval_ms: u64,

    /// Attempts allowed before the connection moves to `error`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_reconnect_interval_ms() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            max_attempts: 3,
        }
    }
}

impl ReconnectConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::flat(self.max_attempts, self.interval())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HealthCheckConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Health check loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// How often the reconciliation pass runs (seconds).
    #[serde(default = "default_health_interval_sec")]
    pub interval_sec: u64,

    /// Unreachable for longer than this (seconds) forces a reconnect even if
    /// the store's own auto-retry is expected to handle it.
    #[serde(default = "default_fallback_threshold_sec")]
    pub fallback_threshold_sec: u64,
}

fn default_health_interval_sec() -> u64 {
    30
}

fn default_fallback_threshold_sec() -> u64 {
    120
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_sec: 30,
            fallback_threshold_sec: 120,
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_sec)
    }

    pub fn fallback_threshold(&self) -> Duration {
        Duration::from_secs(self.fallback_threshold_sec)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SyncWatchConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Stuck-replication detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncWatchConfig {
    /// Pending work without upstream progress for this long (seconds)
    /// forces a reconnect.
    #[serde(default = "default_stuck_threshold_sec")]
    pub stuck_threshold_sec: u64,
}

fn default_stuck_threshold_sec() -> u64 {
    60
}

impl Default for SyncWatchConfig {
    fn default() -> Self {
        Self {
            stuck_threshold_sec: 60,
        }
    }
}

impl SyncWatchConfig {
    pub fn stuck_threshold(&self) -> Duration {
        Duration::from_secs(self.stuck_threshold_sec)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TimeoutConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Bounds on collaborator calls, as duration strings (e.g. "10s", "500ms").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_create_timeout")]
    pub create_timeout: String,

    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: String,
}

fn default_create_timeout() -> String {
    "10s".to_string()
}

fn default_shutdown_timeout() -> String {
    "5s".to_string()
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            create_timeout: "10s".to_string(),
            shutdown_timeout: "5s".to_string(),
        }
    }
}

impl TimeoutConfig {
    /// Parse `create_timeout`, falling back to 10 seconds.
    pub fn create_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.create_timeout).unwrap_or(Duration::from_secs(10))
    }

    /// Parse `shutdown_timeout`, falling back to 5 seconds.
    pub fn shutdown_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.shutdown_timeout).unwrap_or(Duration::from_secs(5))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
