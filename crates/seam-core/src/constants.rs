/// ─── Seam Protocol Constants ────────────────────────────────────────────────
///
/// "Continuous time-mining, claimed on your own schedule."
///
/// All durations are in seconds unless the name says otherwise; all reward
/// amounts are in token units.

// ── Accrual ──────────────────────────────────────────────────────────────────

/// Base reward generated by one full standard (24 h) session at 1.0x rate.
pub const BASE_DAILY_REWARD: f64 = 50.0;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Standard session duration: 24 hours.
pub const SESSION_STANDARD_SECS: i64 = 86_400;

/// Extended session duration (extended-session upgrade): 48 hours.
pub const SESSION_EXTENDED_SECS: i64 = 2 * 86_400;

// ── Claims ───────────────────────────────────────────────────────────────────

/// Minimum wait between successful claims.
pub const CLAIM_COOLDOWN_SECS: i64 = 1_800;

/// Live accrued value at which an auto-claim is attempted (when the
/// cooldown has elapsed).
pub const AUTO_CLAIM_THRESHOLD: f64 = 10.0;

// ── Streak ───────────────────────────────────────────────────────────────────

/// Streak is clamped to [STREAK_MIN, STREAK_MAX] once a first claim exists.
pub const STREAK_MIN: u32 = 1;
pub const STREAK_MAX: u32 = 30;

/// Grace days by streak tier: a streak of 21+ forgives 2 missed days,
/// 7+ forgives 1, below that none.
pub const STREAK_GRACE_TIER2_MIN: u32 = 21;
pub const STREAK_GRACE_TIER1_MIN: u32 = 7;

/// Geometric decay applied per missed day beyond grace.
pub const STREAK_DECAY_FACTOR: f64 = 0.85;

/// Milestone rewards by resulting streak day; all other days pay the daily
/// baseline.
pub const STREAK_DAILY_REWARD: f64 = 500.0;
pub const STREAK_MILESTONE_7: f64 = 10_000.0;
pub const STREAK_MILESTONE_14: f64 = 15_000.0;
pub const STREAK_MILESTONE_21: f64 = 20_000.0;
pub const STREAK_MILESTONE_28: f64 = 25_000.0;

// ── Offline reconciliation ───────────────────────────────────────────────────

/// Amount tolerance for the near-duplicate heuristic guard.
pub const DUPLICATE_AMOUNT_TOLERANCE: f64 = 1e-4;

/// Window within which a near-equal offline credit counts as a duplicate.
pub const DUPLICATE_WINDOW_SECS: i64 = 60;

// ── Retry policy ─────────────────────────────────────────────────────────────

/// Backoff delays for read-only store calls that fail with a transient
/// network error. Writes are never auto-retried.
pub const READ_RETRY_DELAYS_SECS: [u64; 3] = [5, 10, 15];

// ── Runtime cadences ─────────────────────────────────────────────────────────

/// Accrual display tick (also probes the auto-claim threshold).
pub const ACCRUAL_TICK_SECS: u64 = 1;

/// Background auto-start-if-idle check.
pub const AUTO_START_CHECK_SECS: u64 = 60;

/// Full periodic reconciliation against the authoritative store.
pub const FULL_SYNC_SECS: u64 = 120;

/// Local snapshot persistence cadence.
pub const SNAPSHOT_SAVE_SECS: u64 = 60;
