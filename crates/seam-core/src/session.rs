use serde::{Deserialize, Serialize};

use crate::constants::{
    BASE_DAILY_REWARD, SECONDS_PER_DAY, SESSION_EXTENDED_SECS, SESSION_STANDARD_SECS,
};
use crate::types::{Amount, SessionId, Timestamp, UserId};

// ── SessionStatus ────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Expired,
}

// ── MiningSession ────────────────────────────────────────────────────────────

/// A time-boxed mining period. Duration is fixed at creation (24 h standard,
/// 48 h with the extended-session upgrade) and the record is immutable
/// afterwards except for the status flag. At most one session per user is
/// ACTIVE at any time — the store enforces this.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MiningSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub status: SessionStatus,
}

impl MiningSession {
    pub fn new(user_id: UserId, start_time: Timestamp, duration_secs: i64) -> Self {
        Self {
            id: SessionId::random(),
            user_id,
            start_time,
            end_time: start_time + duration_secs,
            status: SessionStatus::Active,
        }
    }

    pub fn duration_secs(&self) -> i64 {
        self.end_time - self.start_time
    }

    /// Whether the session's window has passed, regardless of the stored
    /// status flag. Expiry is lazily observed at read time.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.end_time
    }

    /// Maximum reward the session can generate at 1.0x rate: the base daily
    /// amount scaled by session length (50 for 24 h, 100 for 48 h).
    pub fn max_reward(&self) -> Amount {
        BASE_DAILY_REWARD * self.duration_secs() as f64 / SECONDS_PER_DAY as f64
    }
}

// ── UpgradeFlags ─────────────────────────────────────────────────────────────

/// Read-only account upgrades, purchased once and never revoked. Sourced
/// from an external collaborator; the core only reads them.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct UpgradeFlags {
    /// Multiplier on the accrual rate (1.0 = no upgrade).
    pub rate_multiplier: f64,
    /// Whether new sessions run 48 h instead of 24 h.
    pub extended_session: bool,
}

impl Default for UpgradeFlags {
    fn default() -> Self {
        Self {
            rate_multiplier: 1.0,
            extended_session: false,
        }
    }
}

impl UpgradeFlags {
    /// Session duration chosen at creation time, from the flags alone.
    pub fn session_duration_secs(&self) -> i64 {
        if self.extended_session {
            SESSION_EXTENDED_SECS
        } else {
            SESSION_STANDARD_SECS
        }
    }
}
