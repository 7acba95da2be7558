use serde::{Deserialize, Serialize};

use crate::types::{Amount, EntryId, IdempotencyKey, SessionId, Timestamp, UserId};

// ── EntryKind ────────────────────────────────────────────────────────────────

/// Closed enumeration of balance-affecting event kinds. New kinds must be
/// added here and handled exhaustively — nothing falls through to a default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// A mining session was started. Amount is always 0.
    MiningStart,
    /// Accrued mining reward materialized into claimable balance
    /// (session rollover, in-session claim, or offline reconciliation).
    MiningComplete,
    /// A claim moved claimable balance out of the system's custody.
    Claim,
    /// Daily streak reward.
    StreakReward,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    Pending,
    Completed,
}

// ── LedgerEntry ──────────────────────────────────────────────────────────────

/// An immutable, append-only record of a balance-affecting event.
/// Balances are always derived sums over entries, never stored counters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub user_id: UserId,
    /// Session the entry belongs to, when the event is session-scoped.
    pub session_id: Option<SessionId>,
    pub kind: EntryKind,
    pub amount: Amount,
    pub status: EntryStatus,
    pub created_at: Timestamp,
    /// Idempotency discriminator; the store rejects a second append with
    /// the same key.
    pub idempotency_key: Option<IdempotencyKey>,
}

// ── BalanceSummary ───────────────────────────────────────────────────────────

/// Derived balance view, recomputed from ledger entries on every read.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceSummary {
    /// Credited but not yet claimed: mining_complete + streak_reward − claim.
    pub claimable: Amount,
    /// Lifetime credited total (mining_complete + streak_reward).
    pub total_earned: Amount,
    /// Lifetime claimed total.
    pub claimed: Amount,
    /// Timestamp of the latest claim entry, if any.
    pub last_claim_time: Option<Timestamp>,
}

impl BalanceSummary {
    /// Fold a set of ledger entries into a balance view.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Self {
        let mut summary = Self::default();
        for entry in entries {
            match entry.kind {
                EntryKind::MiningStart => {}
                EntryKind::MiningComplete | EntryKind::StreakReward => {
                    summary.total_earned += entry.amount;
                    summary.claimable += entry.amount;
                }
                EntryKind::Claim => {
                    summary.claimed += entry.amount;
                    summary.claimable -= entry.amount;
                    summary.last_claim_time = Some(
                        summary
                            .last_claim_time
                            .map_or(entry.created_at, |t| t.max(entry.created_at)),
                    );
                }
            }
        }
        summary
    }
}
