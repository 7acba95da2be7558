//! The abstract reward/session store consumed by the engine.
//!
//! Semantics only — transport, schema and query engine are out of scope.
//! Every call is asynchronous and may fail transiently with
//! `SeamError::Network`; the engine decides what is retried.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use seam_core::ledger::{BalanceSummary, EntryKind, LedgerEntry};
use seam_core::session::MiningSession;
use seam_core::streak::StreakState;
use seam_core::types::{Amount, EntryId, IdempotencyKey, SessionId, Timestamp, UserId};
use seam_core::Result;

// ── Eligibility ──────────────────────────────────────────────────────────────

/// External mining-eligibility verdict (quota/grace-period policy lives in
/// the collaborator behind the store).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Eligibility {
    pub can_mine: bool,
    pub quota_remaining: Option<u32>,
    pub reason: Option<String>,
}

impl Eligibility {
    pub fn allowed() -> Self {
        Self {
            can_mine: true,
            quota_remaining: None,
            reason: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            can_mine: false,
            quota_remaining: Some(0),
            reason: Some(reason.into()),
        }
    }
}

// ── RewardStore ──────────────────────────────────────────────────────────────

/// Authoritative session + ledger store.
///
/// Implementations must uphold two invariants the engine relies on:
/// - at most one ACTIVE session per user (`start_session` fails with
///   `SessionConflict` otherwise);
/// - idempotency-key uniqueness on `append_ledger_entry` (`DuplicateKey`
///   on reuse).
#[async_trait]
pub trait RewardStore: Send + Sync {
    /// Create a new ACTIVE session for `user` with the given duration.
    async fn start_session(
        &self,
        user: &UserId,
        duration_secs: i64,
        now: Timestamp,
    ) -> Result<MiningSession>;

    /// The user's ACTIVE session, if any. Returns the stored record as-is;
    /// expiry is the caller's concern (lazy expiry on read).
    async fn get_active_session(&self, user: &UserId) -> Result<Option<MiningSession>>;

    /// Flip a session to EXPIRED and return the total `mining_complete`
    /// amount credited to it (`amount_finalized`). `NotFound` if unknown.
    async fn complete_session(&self, session: &SessionId) -> Result<Amount>;

    /// Derived balance view, recomputed from ledger entries.
    async fn get_balance(&self, user: &UserId) -> Result<BalanceSummary>;

    /// Append an immutable ledger entry. Fails with `DuplicateKey` when the
    /// idempotency key has been seen before.
    #[allow(clippy::too_many_arguments)]
    async fn append_ledger_entry(
        &self,
        user: &UserId,
        session: Option<SessionId>,
        kind: EntryKind,
        amount: Amount,
        created_at: Timestamp,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<EntryId>;

    /// Entries of `kind` for `user` created at or after `since`, used by
    /// the reconciler's near-duplicate guard.
    async fn recent_entries(
        &self,
        user: &UserId,
        kind: EntryKind,
        since: Timestamp,
    ) -> Result<Vec<LedgerEntry>>;

    /// Total `mining_complete` amount already credited to a session.
    async fn session_credited(&self, session: &SessionId) -> Result<Amount>;

    /// Streak state for `user`; a fresh zero state if none is stored.
    async fn get_streak_state(&self, user: &UserId) -> Result<StreakState>;

    async fn set_streak_state(&self, state: &StreakState) -> Result<()>;

    /// External eligibility verdict. A `can_mine = false` result is a
    /// normal answer, not an error.
    async fn get_eligibility(&self, user: &UserId) -> Result<Eligibility>;
}
