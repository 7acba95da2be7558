//! The claim gate: the only writer of `claim` ledger entries.
//!
//! Validation order: amount, cooldown, in-flight. A passing claim first
//! materializes the session's uncredited accrual (total generated minus
//! what the ledger already holds for the session, so offline credits are
//! never offered twice) as a `mining_complete` entry, then appends the
//! `claim` entry. Post-claim the live accrued display reads zero while the
//! claimable balance absorbs the materialized amount; mining continues
//! uninterrupted and no displayed balance is ever zeroed elsewhere.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use seam_core::clock::Clock;
use seam_core::constants::{AUTO_CLAIM_THRESHOLD, CLAIM_COOLDOWN_SECS};
use seam_core::ledger::EntryKind;
use seam_core::session::UpgradeFlags;
use seam_core::types::{Amount, IdempotencyKey, Timestamp, UserId};
use seam_core::{Result, SeamError};
use seam_store::RewardStore;
use tracing::{debug, info};

use crate::accrual;
use crate::lifecycle::SessionManager;
use crate::retry::RetryPolicy;

/// Slack for float comparison between a requested amount and the available
/// balance.
const AMOUNT_EPSILON: f64 = 1e-9;

#[derive(Clone, Debug, PartialEq)]
pub struct ClaimReceipt {
    /// Amount moved out by the claim entry.
    pub amount: Amount,
    pub claimed_at: Timestamp,
    /// Accrued reward materialized into claimable balance by this claim.
    pub materialized: Amount,
    /// True when the store reported the claim entry as already written
    /// (idempotency-key collision) — the effect exists, so the claim is
    /// reported as successful.
    pub deduplicated: bool,
}

pub struct ClaimGate {
    store: Arc<dyn RewardStore>,
    clock: Arc<dyn Clock>,
    sessions: Arc<SessionManager>,
    retry: RetryPolicy,
    /// Per-user in-flight guard. Auto- and manual claims share it, so they
    /// cannot race each other.
    in_flight: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ClaimGate {
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
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn user_guard(&self, user: &UserId) -> Arc<tokio::sync::Mutex<()>> {
        self.in_flight
            .lock()
            .expect("claim gate poisoned")
            .entry(user.clone())
            .or_default()
            .clone()
    }

    /// Execute a manual claim for `requested` units.
    ///
    /// Rejection precedence is InvalidAmount, then CooldownActive, then
    /// AlreadyInFlight: even while another claim holds the mutex, a bad
    /// request is reported as bad rather than as contention.
    pub async fn claim(
        &self,
        user: &UserId,
        requested: Amount,
        upgrades: &UpgradeFlags,
    ) -> Result<ClaimReceipt> {
        let guard = self.user_guard(user);
        match guard.try_lock_owned() {
            Ok(_permit) => self.execute(user, requested, upgrades).await,
            Err(_) => {
                self.validate_only(user, requested, upgrades).await?;
                Err(SeamError::AlreadyInFlight)
            }
        }
    }

    /// The read-only half of the claim checks, used when the mutex is held
    /// by another claim. Does not trigger rollovers.
    async fn validate_only(
        &self,
        user: &UserId,
        requested: Amount,
        upgrades: &UpgradeFlags,
    ) -> Result<()> {
        let session = self
            .retry
            .read("get_active_session", || self.store.get_active_session(user))
            .await?;
        let balance = self
            .retry
            .read("get_balance", || self.store.get_balance(user))
            .await?;
        let now = self.clock.now();

        let accrued = match session.as_ref() {
            Some(s) => {
                let credited = self
                    .retry
                    .read("session_credited", || self.store.session_credited(&s.id))
                    .await?;
                accrual::uncredited_in_session(now, s, credited, upgrades)
            }
            None => 0.0,
        };
        let available = balance.claimable + accrued;
        if requested <= 0.0 || requested > available + AMOUNT_EPSILON {
            return Err(SeamError::InvalidAmount {
                requested,
                available,
            });
        }
        if let Some(last) = balance.last_claim_time {
            let remaining = CLAIM_COOLDOWN_SECS - (now - last);
            if remaining > 0 {
                return Err(SeamError::CooldownActive {
                    remaining_secs: remaining,
                });
            }
        }
        Ok(())
    }

    /// Auto-claim probe, invoked from the accrual tick: claims the live
    /// accrued amount once it crosses the threshold and the cooldown is
    /// clear. Returns `Ok(None)` when there is nothing to do (never an
    /// error for the normal "not yet" cases).
    pub async fn auto_claim(
        &self,
        user: &UserId,
        upgrades: &UpgradeFlags,
    ) -> Result<Option<ClaimReceipt>> {
        let guard = self.user_guard(user);
        let _permit = match guard.try_lock_owned() {
            Ok(p) => p,
            // A manual claim is mid-flight; the next tick will re-probe.
            Err(_) => return Ok(None),
        };

        let session = match self.sessions.get_active(user, upgrades).await? {
            Some(s) => s,
            None => return Ok(None),
        };
        let balance = self
            .retry
            .read("get_balance", || self.store.get_balance(user))
            .await?;
        let now = self.clock.now();

        let credited = self
            .retry
            .read("session_credited", || self.store.session_credited(&session.id))
            .await?;
        let accrued = accrual::uncredited_in_session(now, &session, credited, upgrades);
        if accrued < AUTO_CLAIM_THRESHOLD {
            return Ok(None);
        }
        if let Some(last) = balance.last_claim_time {
            if now - last < CLAIM_COOLDOWN_SECS {
                return Ok(None);
            }
        }

        debug!(user = %user, accrued, "auto-claim threshold crossed");
        self.execute(user, accrued, upgrades).await.map(Some)
    }

    /// The claim body. Caller holds the per-user in-flight permit.
    async fn execute(
        &self,
        user: &UserId,
        requested: Amount,
        upgrades: &UpgradeFlags,
    ) -> Result<ClaimReceipt> {
        // Fetch the session first: a rollover side effect here moves value
        // from "accrued" to "claimable", and the balance read must see it.
        let session = self.sessions.get_active(user, upgrades).await?;
        let balance = self
            .retry
            .read("get_balance", || self.store.get_balance(user))
            .await?;
        let now = self.clock.now();

        // Only the uncredited remainder is on offer: spans already encoded
        // as mining_complete entries (offline reconciliation included) are
        // part of `claimable`, not of `accrued`.
        let accrued = match session.as_ref() {
            Some(s) => {
                let credited = self
                    .retry
                    .read("session_credited", || self.store.session_credited(&s.id))
                    .await?;
                accrual::uncredited_in_session(now, s, credited, upgrades)
            }
            None => 0.0,
        };
        let available = balance.claimable + accrued;

        if requested <= 0.0 || requested > available + AMOUNT_EPSILON {
            return Err(SeamError::InvalidAmount {
                requested,
                available,
            });
        }

        if let Some(last) = balance.last_claim_time {
            let remaining = CLAIM_COOLDOWN_SECS - (now - last);
            if remaining > 0 {
                return Err(SeamError::CooldownActive {
                    remaining_secs: remaining,
                });
            }
        }

        // One claim per cooldown window; the window index is the period
        // boundary in the idempotency keys.
        let slot = now.div_euclid(CLAIM_COOLDOWN_SECS);
        let session_id = session.as_ref().map(|s| s.id);

        // Materialize accrued-but-uncommitted reward so it becomes part of
        // the claimable balance before the claim entry lands.
        if accrued > 0.0 {
            let key = IdempotencyKey::derive(user, session_id.as_ref(), "claim-accrual", slot);
            match self
                .store
                .append_ledger_entry(
                    user,
                    session_id,
                    EntryKind::MiningComplete,
                    accrued,
                    now,
                    Some(key),
                )
                .await
            {
                Ok(_) | Err(SeamError::DuplicateKey(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let key = IdempotencyKey::derive(user, session_id.as_ref(), "claim", slot);
        let deduplicated = match self
            .store
            .append_ledger_entry(user, session_id, EntryKind::Claim, requested, now, Some(key))
            .await
        {
            Ok(_) => false,
            Err(SeamError::DuplicateKey(_)) => true,
            Err(e) => return Err(e),
        };

        info!(
            user = %user,
            amount = requested,
            materialized = accrued,
            deduplicated,
            "claim executed"
        );
        Ok(ClaimReceipt {
            amount: requested,
            claimed_at: now,
            materialized: accrued,
            deduplicated,
        })
    }
}
