//! Fuzz target for configuration parsing.
//!
//! Arbitrary JSON must either fail to parse or yield a config whose
//! validation and duration accessors never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use store_lifecycle::ManagerConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(config) = serde_json::from_slice::<ManagerConfig>(data) {
        let _ = config.validate();
        let _ = config.reconnect.policy();
        let _ = config.health.fallback_threshold();
        let _ = config.sync.stuck_threshold();
        let _ = config.timeouts.create_timeout_duration();
        let _ = config.timeouts.shutdown_timeout_duration();
        let _ = config.dashboard();
    }
});
