//! Local cache mirror.
//!
//! A fast, on-device snapshot of live mining state, written periodically,
//! read by the reconciler on resume and cleared only once the offline
//! interval has actually been settled, so a failed reconciliation can be
//! retried against the same snapshot. Values are versioned bincode; a
//! snapshot in an unknown format is discarded rather than misread.

use std::sync::Arc;

use seam_core::types::{Timestamp, UserId};
use seam_core::{Result, SeamError};
use seam_engine::ResumeSnapshot;
use seam_store::DeviceKv;
use serde::{Deserialize, Serialize};
use tracing::warn;

const SNAPSHOT_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct VersionedSnapshot {
    version: u8,
    snapshot: ResumeSnapshot,
}

pub struct CacheMirror {
    kv: Arc<dyn DeviceKv>,
}

impl CacheMirror {
    pub fn new(kv: Arc<dyn DeviceKv>) -> Self {
        Self { kv }
    }

    fn snapshot_key(user: &UserId) -> String {
        format!("snapshot/{user}")
    }

    fn last_seen_key(user: &UserId) -> String {
        format!("last_seen/{user}")
    }

    pub fn save_snapshot(&self, user: &UserId, snapshot: &ResumeSnapshot) -> Result<()> {
        let bytes = bincode::serialize(&VersionedSnapshot {
            version: SNAPSHOT_VERSION,
            snapshot: snapshot.clone(),
        })
        .map_err(|e| SeamError::Serialization(e.to_string()))?;
        self.kv.set(&Self::snapshot_key(user), &bytes)
    }

    pub fn load_snapshot(&self, user: &UserId) -> Result<Option<ResumeSnapshot>> {
        let Some(bytes) = self.kv.get(&Self::snapshot_key(user))? else {
            return Ok(None);
        };
        match bincode::deserialize::<VersionedSnapshot>(&bytes) {
            Ok(v) if v.version == SNAPSHOT_VERSION => Ok(Some(v.snapshot)),
            Ok(v) => {
                warn!(user = %user, version = v.version, "discarding snapshot in unknown format");
                Ok(None)
            }
            Err(e) => {
                warn!(user = %user, error = %e, "discarding unreadable snapshot");
                Ok(None)
            }
        }
    }

    /// Drop the snapshot once its offline interval is settled, so it is
    /// never replayed by a later resume.
    pub fn clear_snapshot(&self, user: &UserId) -> Result<()> {
        self.kv.remove(&Self::snapshot_key(user))
    }

    pub fn last_seen(&self, user: &UserId) -> Result<Option<Timestamp>> {
        let Some(bytes) = self.kv.get(&Self::last_seen_key(user))? else {
            return Ok(None);
        };
        let arr: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SeamError::Serialization("last_seen is not 8 bytes".to_string()))?;
        Ok(Some(i64::from_be_bytes(arr)))
    }

    pub fn set_last_seen(&self, user: &UserId, ts: Timestamp) -> Result<()> {
        self.kv.set(&Self::last_seen_key(user), &ts.to_be_bytes())
    }

    /// Best-effort flush on teardown.
    pub fn flush(&self) -> Result<()> {
        self.kv.flush()
    }
}
