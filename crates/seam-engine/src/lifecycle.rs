//! Session lifecycle: start, lazy expiry on read, rollover.
//!
//! There is no expiry daemon. Expiry is observed whenever a session is
//! read: `get_active` finalizes a session whose window has passed and
//! immediately starts its successor, so mining is perceived as continuous.

use std::sync::Arc;

use seam_core::clock::Clock;
use seam_core::ledger::EntryKind;
use seam_core::session::{MiningSession, UpgradeFlags};
use seam_core::types::{Amount, IdempotencyKey, UserId};
use seam_core::{Result, SeamError};
use seam_store::RewardStore;
use tracing::{info, warn};

use crate::accrual;
use crate::retry::RetryPolicy;

pub struct SessionManager {
    store: Arc<dyn RewardStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl SessionManager {
    pub fn new(store: Arc<dyn RewardStore>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self { store, clock, retry }
    }

    /// Start a new mining session.
    ///
    /// Fails with `NotEligible` when the external quota policy says no, and
    /// with `SessionConflict` when a live session already exists. A leftover
    /// session whose window has already passed is finalized first rather
    /// than reported as a conflict.
    pub async fn start(&self, user: &UserId, upgrades: &UpgradeFlags) -> Result<MiningSession> {
        let eligibility = self
            .retry
            .read("get_eligibility", || self.store.get_eligibility(user))
            .await?;
        if !eligibility.can_mine {
            return Err(SeamError::NotEligible {
                reason: eligibility
                    .reason
                    .unwrap_or_else(|| "mining quota exhausted".to_string()),
            });
        }

        let now = self.clock.now();
        if let Some(existing) = self.store.get_active_session(user).await? {
            if existing.is_expired(now) {
                self.finalize(&existing, upgrades).await?;
            } else {
                return Err(SeamError::SessionConflict);
            }
        }

        let session = self
            .store
            .start_session(user, upgrades.session_duration_secs(), now)
            .await?;

        let key = IdempotencyKey::derive(user, Some(&session.id), "start", session.start_time);
        match self
            .store
            .append_ledger_entry(user, Some(session.id), EntryKind::MiningStart, 0.0, now, Some(key))
            .await
        {
            Ok(_) | Err(SeamError::DuplicateKey(_)) => {}
            Err(e) => return Err(e),
        }

        info!(
            user = %user,
            session = %session.id,
            duration_secs = session.duration_secs(),
            "mining session started"
        );
        Ok(session)
    }

    /// The user's live session, rolling an expired one over as a side
    /// effect. Returns `None` when the user is not mining (including when a
    /// rollover finalized the old session but the restart failed — that is
    /// non-fatal and retried by the caller's periodic check).
    pub async fn get_active(
        &self,
        user: &UserId,
        upgrades: &UpgradeFlags,
    ) -> Result<Option<MiningSession>> {
        match self.store.get_active_session(user).await? {
            None => Ok(None),
            Some(session) if !session.is_expired(self.clock.now()) => Ok(Some(session)),
            Some(expired) => self.rollover(&expired, upgrades).await,
        }
    }

    /// Finalize an expiring session and immediately start its successor.
    pub async fn rollover(
        &self,
        session: &MiningSession,
        upgrades: &UpgradeFlags,
    ) -> Result<Option<MiningSession>> {
        let finalized = self.finalize(session, upgrades).await?;
        info!(
            user = %session.user_id,
            session = %session.id,
            amount = finalized,
            "session finalized at rollover"
        );

        match self.start(&session.user_id, upgrades).await {
            Ok(next) => Ok(Some(next)),
            Err(e) => {
                // Non-fatal: the user shows as not-mining until the next
                // periodic auto-start check picks them back up.
                warn!(user = %session.user_id, error = %e, "restart after rollover failed");
                Ok(None)
            }
        }
    }

    /// Credit the session's uncredited remainder (total accrual less what
    /// the ledger already holds for the session) and flip it to EXPIRED.
    /// Returns the amount credited by this call.
    pub(crate) async fn finalize(
        &self,
        session: &MiningSession,
        upgrades: &UpgradeFlags,
    ) -> Result<Amount> {
        let already_credited = self
            .retry
            .read("session_credited", || self.store.session_credited(&session.id))
            .await?;

        let now = self.clock.now();
        let window_end = now.min(session.end_time);
        let amount = accrual::uncredited_in_session(now, session, already_credited, upgrades);

        if amount > 0.0 {
            let key = IdempotencyKey::derive(
                &session.user_id,
                Some(&session.id),
                "complete",
                session.end_time,
            );
            match self
                .store
                .append_ledger_entry(
                    &session.user_id,
                    Some(session.id),
                    EntryKind::MiningComplete,
                    amount,
                    window_end,
                    Some(key),
                )
                .await
            {
                Ok(_) | Err(SeamError::DuplicateKey(_)) => {}
                Err(e) => return Err(e),
            }
        }

        self.store.complete_session(&session.id).await?;
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seam_core::clock::ManualClock;
    use seam_core::constants::{SESSION_EXTENDED_SECS, SESSION_STANDARD_SECS};
    use seam_core::ledger::EntryKind;
    use seam_store::{Eligibility, MemoryStore};

    fn setup(now: i64) -> (Arc<MemoryStore>, Arc<ManualClock>, SessionManager) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::at(now));
        let manager = SessionManager::new(store.clone(), clock.clone(), RetryPolicy::none());
        (store, clock, manager)
    }

    fn user() -> UserId {
        UserId::new("alice")
    }

    #[tokio::test]
    async fn start_creates_session_and_start_entry() {
        let (store, _, manager) = setup(1_000);
        let session = manager.start(&user(), &UpgradeFlags::default()).await.unwrap();
        assert_eq!(session.duration_secs(), SESSION_STANDARD_SECS);
        assert_eq!(session.start_time, 1_000);

        let entries = store.entries_for(&user());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::MiningStart);
        assert_eq!(entries[0].amount, 0.0);
    }

    #[tokio::test]
    async fn extended_upgrade_doubles_duration() {
        let (_, _, manager) = setup(0);
        let upgrades = UpgradeFlags {
            extended_session: true,
            ..Default::default()
        };
        let session = manager.start(&user(), &upgrades).await.unwrap();
        assert_eq!(session.duration_secs(), SESSION_EXTENDED_SECS);
    }

    #[tokio::test]
    async fn second_start_conflicts() {
        let (_, _, manager) = setup(0);
        manager.start(&user(), &UpgradeFlags::default()).await.unwrap();
        let err = manager
            .start(&user(), &UpgradeFlags::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SeamError::SessionConflict));
    }

    #[tokio::test]
    async fn ineligible_user_cannot_start() {
        let (store, _, manager) = setup(0);
        store.set_eligibility(&user(), Eligibility::denied("quota exhausted"));
        let err = manager
            .start(&user(), &UpgradeFlags::default())
            .await
            .unwrap_err();
        match err {
            SeamError::NotEligible { reason } => assert_eq!(reason, "quota exhausted"),
            other => panic!("expected NotEligible, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_active_rolls_over_expired_session() {
        let (store, clock, manager) = setup(0);
        let upgrades = UpgradeFlags::default();
        let first = manager.start(&user(), &upgrades).await.unwrap();

        clock.set(first.end_time + 5);
        let next = manager.get_active(&user(), &upgrades).await.unwrap().unwrap();
        assert_ne!(next.id, first.id);
        // Continuity: the successor starts at the observed rollover instant.
        assert_eq!(next.start_time, first.end_time + 5);

        // The expired session got its final mining_complete, capped at 50.
        let completes: Vec<_> = store
            .entries_for(&user())
            .into_iter()
            .filter(|e| e.kind == EntryKind::MiningComplete)
            .collect();
        assert_eq!(completes.len(), 1);
        assert_eq!(completes[0].session_id, Some(first.id));
        assert!((completes[0].amount - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rollover_cap_accounts_for_prior_credits() {
        let (store, clock, manager) = setup(0);
        let upgrades = UpgradeFlags::default();
        let session = manager.start(&user(), &upgrades).await.unwrap();

        // 30 units were already materialized mid-session (e.g. by a claim).
        store
            .append_ledger_entry(
                &user(),
                Some(session.id),
                EntryKind::MiningComplete,
                30.0,
                40_000,
                None,
            )
            .await
            .unwrap();

        clock.set(session.end_time);
        manager.get_active(&user(), &upgrades).await.unwrap();

        let total = store.session_credited(&session.id).await.unwrap();
        assert!(total <= 50.0 + 1e-9, "credited {total} exceeds session max");
    }

    #[tokio::test]
    async fn failed_restart_after_rollover_is_non_fatal() {
        let (store, clock, manager) = setup(0);
        let upgrades = UpgradeFlags::default();
        let session = manager.start(&user(), &upgrades).await.unwrap();

        clock.set(session.end_time + 1);
        store.set_eligibility(&user(), Eligibility::denied("daily quota used"));

        // Old session is finalized, restart fails, user shows as not mining.
        let active = manager.get_active(&user(), &upgrades).await.unwrap();
        assert!(active.is_none());

        let completes: Vec<_> = store
            .entries_for(&user())
            .into_iter()
            .filter(|e| e.kind == EntryKind::MiningComplete)
            .collect();
        assert_eq!(completes.len(), 1);
    }

    #[tokio::test]
    async fn repeated_finalize_credits_once() {
        let (store, clock, manager) = setup(0);
        let upgrades = UpgradeFlags::default();
        let session = manager.start(&user(), &upgrades).await.unwrap();
        clock.set(session.end_time);

        manager.finalize(&session, &upgrades).await.unwrap();
        // Same idempotency key on the second call: no double credit.
        manager.finalize(&session, &upgrades).await.unwrap();

        let total = store.session_credited(&session.id).await.unwrap();
        assert!((total - 50.0).abs() < 1e-9);
    }
}
