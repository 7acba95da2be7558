//! Runtime cadences.

use std::time::Duration;

use seam_core::constants::{
    ACCRUAL_TICK_SECS, AUTO_START_CHECK_SECS, FULL_SYNC_SECS, SNAPSHOT_SAVE_SECS,
};
use seam_engine::RetryPolicy;

/// Cadences for the runtime's recurring tasks. Defaults match production;
/// tests shrink them.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Accrual display tick, which also probes the auto-claim threshold.
    pub tick: Duration,
    /// Auto-start-if-idle check.
    pub auto_start_check: Duration,
    /// Full reconciliation against the authoritative store.
    pub full_sync: Duration,
    /// Local snapshot persistence.
    pub snapshot_save: Duration,
    /// Minimum spacing the sync rate limiter enforces between full syncs,
    /// in wall-clock seconds.
    pub min_sync_interval_secs: i64,
    /// Backoff schedule for read-only store calls.
    pub retry: RetryPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(ACCRUAL_TICK_SECS),
            auto_start_check: Duration::from_secs(AUTO_START_CHECK_SECS),
            full_sync: Duration::from_secs(FULL_SYNC_SECS),
            snapshot_save: Duration::from_secs(SNAPSHOT_SAVE_SECS),
            min_sync_interval_secs: FULL_SYNC_SECS as i64,
            retry: RetryPolicy::default(),
        }
    }
}
