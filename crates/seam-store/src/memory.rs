//! In-memory reference implementation of `RewardStore`.
//!
//! Single-process only; used by engine and runtime tests and as the
//! reference for how a conforming store behaves.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use seam_core::ledger::{BalanceSummary, EntryKind, EntryStatus, LedgerEntry};
use seam_core::session::{MiningSession, SessionStatus};
use seam_core::streak::StreakState;
use seam_core::types::{Amount, EntryId, IdempotencyKey, SessionId, Timestamp, UserId};
use seam_core::{Result, SeamError};

use crate::store::{Eligibility, RewardStore};

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, MiningSession>,
    /// user → currently ACTIVE session.
    active: HashMap<UserId, SessionId>,
    ledger: Vec<LedgerEntry>,
    idem_keys: HashSet<IdempotencyKey>,
    streaks: HashMap<UserId, StreakState>,
    eligibility: HashMap<UserId, Eligibility>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the eligibility verdict for a user (defaults to allowed).
    pub fn set_eligibility(&self, user: &UserId, eligibility: Eligibility) {
        self.inner
            .lock()
            .expect("memory store poisoned")
            .eligibility
            .insert(user.clone(), eligibility);
    }

    /// All ledger entries for a user, in append order.
    pub fn entries_for(&self, user: &UserId) -> Vec<LedgerEntry> {
        self.inner
            .lock()
            .expect("memory store poisoned")
            .ledger
            .iter()
            .filter(|e| &e.user_id == user)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store poisoned")
    }
}

#[async_trait]
impl RewardStore for MemoryStore {
    async fn start_session(
        &self,
        user: &UserId,
        duration_secs: i64,
        now: Timestamp,
    ) -> Result<MiningSession> {
        let mut inner = self.lock();
        if inner.active.contains_key(user) {
            return Err(SeamError::SessionConflict);
        }
        let session = MiningSession::new(user.clone(), now, duration_secs);
        inner.active.insert(user.clone(), session.id);
        inner.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_active_session(&self, user: &UserId) -> Result<Option<MiningSession>> {
        let inner = self.lock();
        Ok(inner
            .active
            .get(user)
            .and_then(|sid| inner.sessions.get(sid))
            .cloned())
    }

    async fn complete_session(&self, session: &SessionId) -> Result<Amount> {
        let mut inner = self.lock();
        let user_id = match inner.sessions.get_mut(session) {
            Some(s) => {
                s.status = SessionStatus::Expired;
                s.user_id.clone()
            }
            None => return Err(SeamError::NotFound(format!("session {session}"))),
        };
        if inner.active.get(&user_id) == Some(session) {
            inner.active.remove(&user_id);
        }
        let finalized = inner
            .ledger
            .iter()
            .filter(|e| e.session_id.as_ref() == Some(session) && e.kind == EntryKind::MiningComplete)
            .map(|e| e.amount)
            .sum();
        Ok(finalized)
    }

    async fn get_balance(&self, user: &UserId) -> Result<BalanceSummary> {
        let inner = self.lock();
        Ok(BalanceSummary::from_entries(
            inner.ledger.iter().filter(|e| &e.user_id == user),
        ))
    }

    async fn append_ledger_entry(
        &self,
        user: &UserId,
        session: Option<SessionId>,
        kind: EntryKind,
        amount: Amount,
        created_at: Timestamp,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<EntryId> {
        let mut inner = self.lock();
        if let Some(key) = idempotency_key {
            if !inner.idem_keys.insert(key) {
                return Err(SeamError::DuplicateKey(key.to_hex()));
            }
        }
        let entry = LedgerEntry {
            id: EntryId::random(),
            user_id: user.clone(),
            session_id: session,
            kind,
            amount,
            status: EntryStatus::Completed,
            created_at,
            idempotency_key,
        };
        let id = entry.id;
        inner.ledger.push(entry);
        Ok(id)
    }

    async fn recent_entries(
        &self,
        user: &UserId,
        kind: EntryKind,
        since: Timestamp,
    ) -> Result<Vec<LedgerEntry>> {
        let inner = self.lock();
        Ok(inner
            .ledger
            .iter()
            .filter(|e| &e.user_id == user && e.kind == kind && e.created_at >= since)
            .cloned()
            .collect())
    }

    async fn session_credited(&self, session: &SessionId) -> Result<Amount> {
        let inner = self.lock();
        Ok(inner
            .ledger
            .iter()
            .filter(|e| e.session_id.as_ref() == Some(session) && e.kind == EntryKind::MiningComplete)
            .map(|e| e.amount)
            .sum())
    }

    async fn get_streak_state(&self, user: &UserId) -> Result<StreakState> {
        let inner = self.lock();
        Ok(inner
            .streaks
            .get(user)
            .cloned()
            .unwrap_or_else(|| StreakState::new(user.clone())))
    }

    async fn set_streak_state(&self, state: &StreakState) -> Result<()> {
        let mut inner = self.lock();
        inner.streaks.insert(state.user_id.clone(), state.clone());
        Ok(())
    }

    async fn get_eligibility(&self, user: &UserId) -> Result<Eligibility> {
        let inner = self.lock();
        Ok(inner
            .eligibility
            .get(user)
            .cloned()
            .unwrap_or_else(Eligibility::allowed))
    }
}
