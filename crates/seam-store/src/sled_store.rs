//! Persistent `RewardStore` backed by sled (pure-Rust, no C dependencies).

use async_trait::async_trait;
use std::path::Path;

use seam_core::ledger::{BalanceSummary, EntryKind, EntryStatus, LedgerEntry};
use seam_core::session::{MiningSession, SessionStatus};
use seam_core::streak::StreakState;
use seam_core::types::{Amount, EntryId, IdempotencyKey, SessionId, Timestamp, UserId};
use seam_core::{Result, SeamError};

use crate::store::{Eligibility, RewardStore};

/// Named trees (analogous to column families):
///   sessions    — SessionId bytes → bincode(MiningSession)
///   active      — user bytes      → SessionId bytes (at most one per user)
///   ledger      — user ∥ created_at_be ∥ EntryId → bincode(LedgerEntry)
///   idem        — IdempotencyKey bytes → EntryId bytes
///   streaks     — user bytes      → bincode(StreakState)
///   eligibility — user bytes      → bincode(Eligibility)
pub struct SledStore {
    _db: sled::Db,
    sessions: sled::Tree,
    active: sled::Tree,
    ledger: sled::Tree,
    idem: sled::Tree,
    streaks: sled::Tree,
    eligibility: sled::Tree,
}

fn storage_err(e: impl std::fmt::Display) -> SeamError {
    SeamError::Storage(e.to_string())
}

fn codec_err(e: impl std::fmt::Display) -> SeamError {
    SeamError::Serialization(e.to_string())
}

/// Ledger key: user bytes ∥ created_at (big-endian) ∥ entry id, so a prefix
/// scan on the user yields entries in time order.
fn ledger_key(user: &UserId, created_at: Timestamp, id: &EntryId) -> Vec<u8> {
    let mut key = Vec::with_capacity(user.as_str().len() + 1 + 8 + 16);
    key.extend_from_slice(user.as_str().as_bytes());
    key.push(0); // separator: user ids never contain NUL
    key.extend_from_slice(&created_at.to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

fn user_prefix(user: &UserId) -> Vec<u8> {
    let mut key = Vec::with_capacity(user.as_str().len() + 1);
    key.extend_from_slice(user.as_str().as_bytes());
    key.push(0);
    key
}

impl SledStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path).map_err(storage_err)?;
        let sessions    = db.open_tree("sessions").map_err(storage_err)?;
        let active      = db.open_tree("active").map_err(storage_err)?;
        let ledger      = db.open_tree("ledger").map_err(storage_err)?;
        let idem        = db.open_tree("idem").map_err(storage_err)?;
        let streaks     = db.open_tree("streaks").map_err(storage_err)?;
        let eligibility = db.open_tree("eligibility").map_err(storage_err)?;
        Ok(Self { _db: db, sessions, active, ledger, idem, streaks, eligibility })
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self._db.flush().map_err(storage_err)?;
        Ok(())
    }

    /// Persist an eligibility verdict (normally pushed by the external
    /// quota service; exposed here for operational tooling and tests).
    pub fn put_eligibility(&self, user: &UserId, e: &Eligibility) -> Result<()> {
        let bytes = bincode::serialize(e).map_err(codec_err)?;
        self.eligibility
            .insert(user.as_str().as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    fn get_session(&self, id: &SessionId) -> Result<Option<MiningSession>> {
        match self.sessions.get(id.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(codec_err)?)),
            None => Ok(None),
        }
    }

    fn put_session(&self, session: &MiningSession) -> Result<()> {
        let bytes = bincode::serialize(session).map_err(codec_err)?;
        self.sessions
            .insert(session.id.as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    fn user_entries(&self, user: &UserId) -> Result<Vec<LedgerEntry>> {
        let mut entries = Vec::new();
        for item in self.ledger.scan_prefix(user_prefix(user)) {
            let (_, bytes) = item.map_err(storage_err)?;
            entries.push(bincode::deserialize(&bytes).map_err(codec_err)?);
        }
        Ok(entries)
    }
}

#[async_trait]
impl RewardStore for SledStore {
    async fn start_session(
        &self,
        user: &UserId,
        duration_secs: i64,
        now: Timestamp,
    ) -> Result<MiningSession> {
        let session = MiningSession::new(user.clone(), now, duration_secs);
        let sid_bytes = session.id.as_bytes().to_vec();

        // The record is written before the active pointer, so the pointer
        // never references a session that does not exist. If the swap loses,
        // the record stays behind unreferenced, which is harmless.
        self.put_session(&session)?;

        // compare_and_swap on the active tree is what enforces the
        // one-ACTIVE-session invariant under concurrent starts.
        let swapped = self
            .active
            .compare_and_swap(
                user.as_str().as_bytes(),
                None::<&[u8]>,
                Some(sid_bytes.as_slice()),
            )
            .map_err(storage_err)?;
        if swapped.is_err() {
            return Err(SeamError::SessionConflict);
        }

        Ok(session)
    }

    async fn get_active_session(&self, user: &UserId) -> Result<Option<MiningSession>> {
        match self.active.get(user.as_str().as_bytes()).map_err(storage_err)? {
            Some(sid_bytes) => {
                let mut arr = [0u8; 16];
                arr.copy_from_slice(&sid_bytes);
                self.get_session(&SessionId::from_bytes(arr))
            }
            None => Ok(None),
        }
    }

    async fn complete_session(&self, session: &SessionId) -> Result<Amount> {
        let mut record = self
            .get_session(session)?
            .ok_or_else(|| SeamError::NotFound(format!("session {session}")))?;
        record.status = SessionStatus::Expired;
        self.put_session(&record)?;

        // Drop the active pointer only if it still points at this session.
        let _ = self
            .active
            .compare_and_swap(
                record.user_id.as_str().as_bytes(),
                Some(session.as_bytes().as_slice()),
                None::<&[u8]>,
            )
            .map_err(storage_err)?;

        self.session_credited(session).await
    }

    async fn get_balance(&self, user: &UserId) -> Result<BalanceSummary> {
        Ok(BalanceSummary::from_entries(&self.user_entries(user)?))
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
        let id = EntryId::random();

        if let Some(key) = idempotency_key {
            let swapped = self
                .idem
                .compare_and_swap(
                    key.as_bytes(),
                    None::<&[u8]>,
                    Some(id.as_bytes().as_slice()),
                )
                .map_err(storage_err)?;
            if swapped.is_err() {
                return Err(SeamError::DuplicateKey(key.to_hex()));
            }
        }

        let entry = LedgerEntry {
            id,
            user_id: user.clone(),
            session_id: session,
            kind,
            amount,
            status: EntryStatus::Completed,
            created_at,
            idempotency_key,
        };
        let bytes = bincode::serialize(&entry).map_err(codec_err)?;
        self.ledger
            .insert(ledger_key(user, created_at, &id), bytes)
            .map_err(storage_err)?;
        Ok(id)
    }

    async fn recent_entries(
        &self,
        user: &UserId,
        kind: EntryKind,
        since: Timestamp,
    ) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .user_entries(user)?
            .into_iter()
            .filter(|e| e.kind == kind && e.created_at >= since)
            .collect())
    }

    async fn session_credited(&self, session: &SessionId) -> Result<Amount> {
        let record = self
            .get_session(session)?
            .ok_or_else(|| SeamError::NotFound(format!("session {session}")))?;
        Ok(self
            .user_entries(&record.user_id)?
            .into_iter()
            .filter(|e| e.session_id.as_ref() == Some(session) && e.kind == EntryKind::MiningComplete)
            .map(|e| e.amount)
            .sum())
    }

    async fn get_streak_state(&self, user: &UserId) -> Result<StreakState> {
        match self.streaks.get(user.as_str().as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(bincode::deserialize(&bytes).map_err(codec_err)?),
            None => Ok(StreakState::new(user.clone())),
        }
    }

    async fn set_streak_state(&self, state: &StreakState) -> Result<()> {
        let bytes = bincode::serialize(state).map_err(codec_err)?;
        self.streaks
            .insert(state.user_id.as_str().as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    async fn get_eligibility(&self, user: &UserId) -> Result<Eligibility> {
        match self
            .eligibility
            .get(user.as_str().as_bytes())
            .map_err(storage_err)?
        {
            Some(bytes) => Ok(bincode::deserialize(&bytes).map_err(codec_err)?),
            None => Ok(Eligibility::allowed()),
        }
    }
}
