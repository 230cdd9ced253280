//! Fuzz target for stuck-sync derivation.
//!
//! Any observation sequence must keep `stuck_since` in the past and never
//! report a stall while nothing is pending.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::time::Duration;
use store_lifecycle::{SyncProgress, SyncStatus};
use tokio::time::Instant;

fuzz_target!(|steps: Vec<(u16, u8, u8)>| {
    let mut now = Instant::now();
    let mut previous: Option<SyncStatus> = None;

    for (gap_ms, pending, upstream) in steps {
        now += Duration::from_millis(gap_ms as u64);
        let progress = SyncProgress::new(pending as u64, "local", upstream.to_string());
        let next = SyncStatus::observe(previous.as_ref(), progress, now);

        if next.pending_count == 0 {
            assert!(next.stuck_since.is_none());
        }
        if let Some(since) = next.stuck_since {
            assert!(since <= now);
        }
        let _ = next.is_stuck(now, Duration::from_secs(60));
        previous = Some(next);
    }
});
