use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// Daily-login streak state. Persists indefinitely; decays rather than
/// resets when days are missed. Mutated at most once per UTC day, by the
/// streak tracker.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StreakState {
    pub user_id: UserId,
    /// Current streak in days, in [1, 30] once a first claim exists.
    pub current_streak: u32,
    pub longest_streak: u32,
    /// UTC date of the last streak claim; None before the first claim.
    pub last_claim_date: Option<NaiveDate>,
}

impl StreakState {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            current_streak: 0,
            longest_streak: 0,
            last_claim_date: None,
        }
    }
}
