//! Offline earnings reconciliation.
//!
//! On resume-from-background, the earnings the client missed while inactive
//! are credited once. Double-crediting is guarded twice over: a true
//! idempotency key derived from the offline window, and a heuristic
//! near-duplicate check over recent ledger entries for overlapping resume
//! callbacks that race before either key lands.

use std::sync::Arc;

use seam_core::clock::Clock;
use seam_core::constants::{DUPLICATE_AMOUNT_TOLERANCE, DUPLICATE_WINDOW_SECS};
use seam_core::ledger::EntryKind;
use seam_core::session::UpgradeFlags;
use seam_core::types::{Amount, IdempotencyKey, SessionId, Timestamp, UserId};
use seam_core::{Result, SeamError};
use seam_store::RewardStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::accrual;
use crate::lifecycle::SessionManager;
use crate::retry::RetryPolicy;

/// Periodic snapshot of live mining state, persisted on-device so a later
/// resume can tell how far accrual had visibly progressed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ResumeSnapshot {
    pub session_id: SessionId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub basis: Timestamp,
    /// Displayed accrued value at save time; bounds the offline credit so
    /// the session cap holds even if the ledger read is stale.
    pub accrued: Amount,
    pub saved_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReconcileReport {
    pub credited: Amount,
    /// The offline interval that was settled, empty when nothing applied.
    pub window: Option<(Timestamp, Timestamp)>,
    /// True when the credit was skipped because an equivalent entry already
    /// existed (either guard).
    pub deduplicated: bool,
}

impl ReconcileReport {
    fn nothing() -> Self {
        Self {
            credited: 0.0,
            window: None,
            deduplicated: false,
        }
    }

    fn skipped(window: (Timestamp, Timestamp)) -> Self {
        Self {
            credited: 0.0,
            window: Some(window),
            deduplicated: true,
        }
    }
}

pub struct Reconciler {
    store: Arc<dyn RewardStore>,
    clock: Arc<dyn Clock>,
    sessions: Arc<SessionManager>,
    retry: RetryPolicy,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn RewardStore>,
        clock: Arc<dyn Clock>,
        sessions: Arc<SessionManager>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            sessions,
            retry,
        }
    }

    /// Settle the offline interval `[max(last_seen, basis), min(now, end))`.
    ///
    /// A session that expired while offline is rolled over first (the
    /// rollover itself credits the old session through its end), and the
    /// remaining math runs against the successor's basis. Callers advance
    /// their last-seen marker before calling in.
    pub async fn reconcile(
        &self,
        user: &UserId,
        snapshot: Option<&ResumeSnapshot>,
        last_seen: Timestamp,
        upgrades: &UpgradeFlags,
    ) -> Result<ReconcileReport> {
        // Lazy expiry on read: an offline-expired session rolls over here.
        let session = match self.sessions.get_active(user, upgrades).await? {
            Some(s) => s,
            None => return Ok(ReconcileReport::nothing()),
        };

        let balance = self
            .retry
            .read("get_balance", || self.store.get_balance(user))
            .await?;
        let now = self.clock.now();

        let basis = accrual::basis_for_session(&session, balance.last_claim_time);
        let offline_end = now.min(session.end_time);
        let offline_start = last_seen.max(basis);
        if offline_start >= offline_end {
            return Ok(ReconcileReport::nothing());
        }

        let rate = accrual::rate_per_second(upgrades);
        let interval_earned = accrual::accrued(offline_end, offline_start, rate);

        // Heuristic guard: overlapping resume callbacks can both get this
        // far before either write lands. A near-equal credit in the last
        // minute means this interval was already settled. The comparison
        // uses the raw interval earnings, which is what a racing duplicate
        // would have written.
        let recent = self
            .retry
            .read("recent_entries", || {
                self.store
                    .recent_entries(user, EntryKind::MiningComplete, now - DUPLICATE_WINDOW_SECS)
            })
            .await?;
        if recent
            .iter()
            .any(|e| (e.amount - interval_earned).abs() <= DUPLICATE_AMOUNT_TOLERANCE)
        {
            debug!(user = %user, interval_earned, "offline credit already written; skipping");
            return Ok(ReconcileReport::skipped((offline_start, offline_end)));
        }

        // Cap at the session's uncredited pool — total accrual to date less
        // what the ledger already holds — and at what the snapshot says had
        // visibly accrued at save time. An interval that overlaps credits
        // already on the ledger can only add the remainder.
        let credited = self
            .retry
            .read("session_credited", || self.store.session_credited(&session.id))
            .await?;
        let mut earned =
            interval_earned.min(accrual::uncredited_in_session(now, &session, credited, upgrades));
        if let Some(snap) = snapshot.filter(|s| s.session_id == session.id) {
            let max = accrual::session_max(&session, upgrades);
            earned = earned.min((max - snap.accrued).max(0.0));
        }
        if earned <= 0.0 {
            return Ok(ReconcileReport::nothing());
        }

        let key = IdempotencyKey::derive(user, Some(&session.id), "offline", offline_end);
        match self
            .store
            .append_ledger_entry(
                user,
                Some(session.id),
                EntryKind::MiningComplete,
                earned,
                now,
                Some(key),
            )
            .await
        {
            Ok(_) => {}
            Err(SeamError::DuplicateKey(_)) => {
                return Ok(ReconcileReport::skipped((offline_start, offline_end)))
            }
            Err(e) => return Err(e),
        }

        info!(
            user = %user,
            credited = earned,
            from = offline_start,
            to = offline_end,
            "offline earnings reconciled"
        );
        Ok(ReconcileReport {
            credited: earned,
            window: Some((offline_start, offline_end)),
            deduplicated: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seam_core::clock::ManualClock;
    use seam_core::session::MiningSession;
    use seam_store::MemoryStore;

    fn user() -> UserId {
        UserId::new("alice")
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        sessions: Arc<SessionManager>,
        reconciler: Reconciler,
    }

    fn setup(now: i64) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::at(now));
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            clock.clone(),
            RetryPolicy::none(),
        ));
        let reconciler = Reconciler::new(
            store.clone(),
            clock.clone(),
            sessions.clone(),
            RetryPolicy::none(),
        );
        Fixture {
            store,
            clock,
            sessions,
            reconciler,
        }
    }

    fn snapshot_of(session: &MiningSession, accrued: f64, saved_at: i64) -> ResumeSnapshot {
        ResumeSnapshot {
            session_id: session.id,
            start_time: session.start_time,
            end_time: session.end_time,
            basis: session.start_time,
            accrued,
            saved_at,
        }
    }

    #[tokio::test]
    async fn credits_the_offline_interval() {
        let fx = setup(0);
        let upgrades = UpgradeFlags::default();
        let session = fx.sessions.start(&user(), &upgrades).await.unwrap();

        // Backgrounded at t=1000, resumed at t=5000.
        fx.clock.set(5_000);
        let snap = snapshot_of(&session, 1_000.0 * 50.0 / 86_400.0, 1_000);
        let report = fx
            .reconciler
            .reconcile(&user(), Some(&snap), 1_000, &upgrades)
            .await
            .unwrap();

        let expected = 4_000.0 * 50.0 / 86_400.0;
        assert!((report.credited - expected).abs() < 1e-9);
        assert_eq!(report.window, Some((1_000, 5_000)));
        assert!(!report.deduplicated);
    }

    #[tokio::test]
    async fn double_invocation_credits_once() {
        let fx = setup(0);
        let upgrades = UpgradeFlags::default();
        let session = fx.sessions.start(&user(), &upgrades).await.unwrap();

        fx.clock.set(5_000);
        let snap = snapshot_of(&session, 0.0, 1_000);
        let first = fx
            .reconciler
            .reconcile(&user(), Some(&snap), 1_000, &upgrades)
            .await
            .unwrap();
        let second = fx
            .reconciler
            .reconcile(&user(), Some(&snap), 1_000, &upgrades)
            .await
            .unwrap();

        assert!(first.credited > 0.0);
        assert_eq!(second.credited, 0.0);
        assert!(second.deduplicated);

        let total = fx.store.session_credited(&session.id).await.unwrap();
        assert!((total - first.credited).abs() < 1e-9);
    }

    #[tokio::test]
    async fn near_equal_recent_credit_is_skipped() {
        let fx = setup(0);
        let upgrades = UpgradeFlags::default();
        let session = fx.sessions.start(&user(), &upgrades).await.unwrap();

        fx.clock.set(5_000);
        let expected = 4_000.0 * 50.0 / 86_400.0;
        // A concurrent resume path wrote the credit 30 s ago, under a
        // different key.
        fx.store
            .append_ledger_entry(
                &user(),
                Some(session.id),
                EntryKind::MiningComplete,
                expected,
                4_970,
                None,
            )
            .await
            .unwrap();

        let report = fx
            .reconciler
            .reconcile(&user(), None, 1_000, &upgrades)
            .await
            .unwrap();
        assert_eq!(report.credited, 0.0);
        assert!(report.deduplicated);
    }

    #[tokio::test]
    async fn credit_respects_the_session_cap() {
        let fx = setup(0);
        let upgrades = UpgradeFlags::default();
        let session = fx.sessions.start(&user(), &upgrades).await.unwrap();

        // 45 units already credited mid-session; a long offline stretch may
        // only add 5 more.
        fx.store
            .append_ledger_entry(
                &user(),
                Some(session.id),
                EntryKind::MiningComplete,
                45.0,
                70_000,
                None,
            )
            .await
            .unwrap();

        fx.clock.set(session.end_time - 1);
        let report = fx
            .reconciler
            .reconcile(&user(), None, 1_000, &upgrades)
            .await
            .unwrap();
        assert!(report.credited <= 5.0 + 1e-9);

        let total = fx.store.session_credited(&session.id).await.unwrap();
        assert!(total <= 50.0 + 1e-9);
    }

    #[tokio::test]
    async fn credit_never_exceeds_uncredited_accrual() {
        let fx = setup(0);
        let upgrades = UpgradeFlags::default();
        let session = fx.sessions.start(&user(), &upgrades).await.unwrap();

        // A credit covering [1000, 5000) is already on the ledger.
        let prior = 4_000.0 * 50.0 / 86_400.0;
        fx.store
            .append_ledger_entry(
                &user(),
                Some(session.id),
                EntryKind::MiningComplete,
                prior,
                4_990,
                None,
            )
            .await
            .unwrap();

        // A stale last-seen marker asks for an overlapping interval; only
        // the [0, 1000) remainder may still be credited.
        fx.clock.set(5_000);
        let report = fx
            .reconciler
            .reconcile(&user(), None, 500, &upgrades)
            .await
            .unwrap();
        let remainder = 1_000.0 * 50.0 / 86_400.0;
        assert!((report.credited - remainder).abs() < 1e-9);

        let total = fx.store.session_credited(&session.id).await.unwrap();
        let earned = 5_000.0 * 50.0 / 86_400.0;
        assert!((total - earned).abs() < 1e-9);
    }

    #[tokio::test]
    async fn expired_session_rolls_over_before_reconciling() {
        let fx = setup(0);
        let upgrades = UpgradeFlags::default();
        let first = fx.sessions.start(&user(), &upgrades).await.unwrap();

        // Resume long after the session ended. Rollover settles the old
        // session in full; the new session has no offline interval yet.
        fx.clock.set(first.end_time + 500);
        let snap = snapshot_of(&first, 10.0, 40_000);
        let report = fx
            .reconciler
            .reconcile(&user(), Some(&snap), 40_000, &upgrades)
            .await
            .unwrap();
        assert_eq!(report.credited, 0.0);

        let active = fx.store.get_active_session(&user()).await.unwrap().unwrap();
        assert_ne!(active.id, first.id);
        let old_total = fx.store.session_credited(&first.id).await.unwrap();
        assert!((old_total - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_interval_is_a_no_op() {
        let fx = setup(0);
        let upgrades = UpgradeFlags::default();
        fx.sessions.start(&user(), &upgrades).await.unwrap();

        // last_seen is in the future of now (clock skew): nothing to settle.
        fx.clock.set(5_000);
        let report = fx
            .reconciler
            .reconcile(&user(), None, 6_000, &upgrades)
            .await
            .unwrap();
        assert_eq!(report.credited, 0.0);
        assert_eq!(report.window, None);
    }

    #[tokio::test]
    async fn no_active_session_reconciles_nothing() {
        let fx = setup(0);
        let report = fx
            .reconciler
            .reconcile(&user(), None, 0, &UpgradeFlags::default())
            .await
            .unwrap();
        assert_eq!(report, ReconcileReport::nothing());
    }
}
