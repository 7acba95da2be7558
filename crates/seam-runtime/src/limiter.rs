//! Full-sync rate limiter.
//!
//! An explicit, constructible object holding its own state and clock, so it
//! is testable and never shared accidentally across unrelated runtimes.

use std::sync::{Arc, Mutex};

use seam_core::clock::Clock;
use seam_core::types::Timestamp;

#[derive(Debug, Default)]
struct LimiterState {
    last_sync: Option<Timestamp>,
    syncs: u64,
}

pub struct SyncRateLimiter {
    clock: Arc<dyn Clock>,
    min_interval_secs: i64,
    state: Mutex<LimiterState>,
}

impl SyncRateLimiter {
    pub fn new(clock: Arc<dyn Clock>, min_interval_secs: i64) -> Self {
        Self {
            clock,
            min_interval_secs,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Consume a sync slot if the minimum spacing has elapsed.
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock().expect("limiter poisoned");
        if let Some(last) = state.last_sync {
            if now - last < self.min_interval_secs {
                return false;
            }
        }
        state.last_sync = Some(now);
        state.syncs += 1;
        true
    }

    /// Seconds until the next sync slot opens; zero when ready.
    pub fn seconds_until_ready(&self) -> i64 {
        let state = self.state.lock().expect("limiter poisoned");
        match state.last_sync {
            Some(last) => (self.min_interval_secs - (self.clock.now() - last)).max(0),
            None => 0,
        }
    }

    pub fn syncs(&self) -> u64 {
        self.state.lock().expect("limiter poisoned").syncs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seam_core::clock::ManualClock;

    #[test]
    fn first_acquire_is_free() {
        let clock = Arc::new(ManualClock::at(1_000));
        let limiter = SyncRateLimiter::new(clock, 120);
        assert!(limiter.try_acquire());
        assert_eq!(limiter.syncs(), 1);
    }

    #[test]
    fn spacing_is_enforced() {
        let clock = Arc::new(ManualClock::at(1_000));
        let limiter = SyncRateLimiter::new(clock.clone(), 120);
        assert!(limiter.try_acquire());

        clock.advance(60);
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.seconds_until_ready(), 60);

        clock.advance(60);
        assert!(limiter.try_acquire());
        assert_eq!(limiter.syncs(), 2);
    }

    #[test]
    fn limiters_do_not_share_state() {
        let clock = Arc::new(ManualClock::at(0));
        let a = SyncRateLimiter::new(clock.clone(), 120);
        let b = SyncRateLimiter::new(clock, 120);
        assert!(a.try_acquire());
        assert!(b.try_acquire());
    }
}
