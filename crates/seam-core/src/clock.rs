//! Injectable wall-clock abstraction.
//!
//! All time-dependent logic takes a `Clock` rather than calling the system
//! clock directly, so cooldowns, session expiry and streak day boundaries
//! are testable without sleeping.

use crate::types::Timestamp;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the current wall-clock time (Unix seconds, UTC).
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Production clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp()
    }
}

/// Manually-driven clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn at(now: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// UTC calendar date of a timestamp. Streak continuation is decided at
/// UTC-day granularity, never local time.
pub fn utc_date(ts: Timestamp) -> NaiveDate {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.date_naive())
        .unwrap_or(NaiveDate::MIN)
}

/// Whole UTC days elapsed from `earlier` to `later` (negative if `later`
/// is an earlier calendar day).
pub fn days_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
    (later - earlier).num_days()
}
