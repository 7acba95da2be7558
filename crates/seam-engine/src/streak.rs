//! Daily-login streak and milestone rewards.
//!
//! Streaks decay rather than reset: a long streak earns grace days, and
//! missed days beyond grace apply a geometric penalty that never drops the
//! streak below 1.

use std::sync::Arc;

use seam_core::clock::{days_between, utc_date, Clock};
use seam_core::constants::{
    SECONDS_PER_DAY, STREAK_DAILY_REWARD, STREAK_DECAY_FACTOR, STREAK_GRACE_TIER1_MIN,
    STREAK_GRACE_TIER2_MIN, STREAK_MAX, STREAK_MILESTONE_14, STREAK_MILESTONE_21,
    STREAK_MILESTONE_28, STREAK_MILESTONE_7, STREAK_MIN,
};
use seam_core::ledger::EntryKind;
use seam_core::types::{Amount, IdempotencyKey, UserId};
use seam_core::{Result, SeamError};
use seam_store::RewardStore;
use tracing::info;

use crate::retry::RetryPolicy;

/// Grace days earned by the current streak tier.
pub fn grace_days(current: u32) -> i64 {
    if current >= STREAK_GRACE_TIER2_MIN {
        2
    } else if current >= STREAK_GRACE_TIER1_MIN {
        1
    } else {
        0
    }
}

/// The streak value after a claim `days_since` days after the previous one.
/// `days_since = None` means first claim ever. Callers must handle
/// `days_since <= 0` (already claimed today) before calling; it is treated
/// here as a same-day no-change.
pub fn advance_streak(current: u32, days_since: Option<i64>) -> u32 {
    let next = match days_since {
        None => 1,
        Some(d) if d <= 0 => current,
        Some(1) => current + 1,
        Some(d) => {
            let missed = d - 1;
            let grace = grace_days(current);
            if missed <= grace {
                // Small linear penalty, forgiven days excluded.
                current.saturating_sub(missed as u32)
            } else {
                let penalty = (missed - grace) as i32;
                (current as f64 * STREAK_DECAY_FACTOR.powi(penalty)).floor() as u32
            }
        }
    };
    next.clamp(STREAK_MIN, STREAK_MAX)
}

/// Reward for the resulting streak day. Milestones pay out on the exact
/// day; every other day pays the baseline.
pub fn reward_for_day(day: u32) -> Amount {
    match day {
        7 => STREAK_MILESTONE_7,
        14 => STREAK_MILESTONE_14,
        21 => STREAK_MILESTONE_21,
        28 => STREAK_MILESTONE_28,
        _ => STREAK_DAILY_REWARD,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StreakOutcome {
    pub streak: u32,
    pub longest: u32,
    pub reward: Amount,
}

pub struct StreakTracker {
    store: Arc<dyn RewardStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl StreakTracker {
    pub fn new(store: Arc<dyn RewardStore>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self { store, clock, retry }
    }

    /// Claim today's streak reward. At most one mutation per UTC day:
    /// returns `Ok(None)` when today's claim already happened (locally or,
    /// via the idempotency key, on another device).
    pub async fn claim_daily(&self, user: &UserId) -> Result<Option<StreakOutcome>> {
        let state = self
            .retry
            .read("get_streak_state", || self.store.get_streak_state(user))
            .await?;

        let now = self.clock.now();
        let today = utc_date(now);
        let days_since = state.last_claim_date.map(|d| days_between(d, today));
        if matches!(days_since, Some(d) if d <= 0) {
            return Ok(None);
        }

        let streak = advance_streak(state.current_streak, days_since);
        let reward = reward_for_day(streak);

        // Period boundary is the UTC day index, so two devices claiming the
        // same day derive the same key.
        let day_index = now.div_euclid(SECONDS_PER_DAY);
        let key = IdempotencyKey::derive(user, None, "streak", day_index);
        match self
            .store
            .append_ledger_entry(user, None, EntryKind::StreakReward, reward, now, Some(key))
            .await
        {
            Ok(_) => {}
            Err(SeamError::DuplicateKey(_)) => return Ok(None),
            Err(e) => return Err(e),
        }

        let mut state = state;
        state.current_streak = streak;
        state.longest_streak = state.longest_streak.max(streak);
        state.last_claim_date = Some(today);
        self.store.set_streak_state(&state).await?;

        info!(user = %user, streak, reward, "streak reward claimed");
        Ok(Some(StreakOutcome {
            streak,
            longest: state.longest_streak,
            reward,
        }))
    }
}
