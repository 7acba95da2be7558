//! Pure accrual math.
//!
//! Nothing in this module touches the ledger — it only produces numbers for
//! display and for the claim gate to validate against.

use seam_core::constants::{BASE_DAILY_REWARD, SECONDS_PER_DAY};
use seam_core::session::{MiningSession, UpgradeFlags};
use seam_core::types::{Amount, Timestamp};

/// Tokens generated per second: `(base_daily × rate_multiplier) / 86_400`.
pub fn rate_per_second(upgrades: &UpgradeFlags) -> f64 {
    BASE_DAILY_REWARD * upgrades.rate_multiplier / SECONDS_PER_DAY as f64
}

/// Reward accrued since `basis`. Negative elapsed time (clock skew) clamps
/// to zero.
pub fn accrued(now: Timestamp, basis: Timestamp, rate_per_second: f64) -> Amount {
    (now - basis).max(0) as f64 * rate_per_second
}

/// The accrual basis: a claim inside the session shifts it forward, but
/// mining itself continues uninterrupted from the claim point.
pub fn earnings_basis(session_start: Timestamp, last_claim: Option<Timestamp>) -> Timestamp {
    match last_claim {
        Some(t) if t > session_start => t,
        _ => session_start,
    }
}

/// The claim timestamp only moves the basis when it falls inside the
/// session window; claims from a previous session are ignored.
pub fn basis_for_session(session: &MiningSession, last_claim: Option<Timestamp>) -> Timestamp {
    let in_window =
        last_claim.filter(|t| *t >= session.start_time && *t < session.end_time);
    earnings_basis(session.start_time, in_window)
}

/// Maximum reward a session can generate, scaled by the rate multiplier so
/// upgraded accounts do not hit the cap early.
pub fn session_max(session: &MiningSession, upgrades: &UpgradeFlags) -> Amount {
    session.max_reward() * upgrades.rate_multiplier
}

/// Accrual the session has generated but not yet materialized as
/// `mining_complete` entries. Claim materialization, offline reconciliation
/// and rollover finalization all draw from this one non-replenishing pool:
/// whatever any of them credits is subtracted from what the others may
/// still credit, so the same span can never be encoded twice.
pub fn uncredited_in_session(
    now: Timestamp,
    session: &MiningSession,
    already_credited: Amount,
    upgrades: &UpgradeFlags,
) -> Amount {
    let window_end = now.min(session.end_time);
    let total = accrued(window_end, session.start_time, rate_per_second(upgrades))
        .min(session_max(session, upgrades));
    (total - already_credited).max(0.0)
}
