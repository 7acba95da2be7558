//! Minimal typed on-device key/value store.
//!
//! The runtime persists a small per-user snapshot (session window, accrual
//! basis, last-seen timestamp) between launches. The interface is get/set/
//! remove by string key with opaque byte values; value shapes and
//! versioning live with the caller (see the runtime's cache mirror).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use seam_core::{Result, SeamError};

pub trait DeviceKv: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    /// Best-effort synchronous flush, called once on teardown.
    fn flush(&self) -> Result<()>;
}

// ── MemoryKv ─────────────────────────────────────────────────────────────────

/// Volatile implementation for tests.
#[derive(Default)]
pub struct MemoryKv {
    map: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceKv for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.map.lock().expect("kv poisoned").get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.map
            .lock()
            .expect("kv poisoned")
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.map.lock().expect("kv poisoned").remove(key);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

// ── SledKv ───────────────────────────────────────────────────────────────────

/// Durable implementation over a dedicated sled tree.
pub struct SledKv {
    _db: sled::Db,
    tree: sled::Tree,
}

impl SledKv {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path).map_err(|e| SeamError::Storage(e.to_string()))?;
        let tree = db
            .open_tree("device_kv")
            .map_err(|e| SeamError::Storage(e.to_string()))?;
        Ok(Self { _db: db, tree })
    }
}

impl DeviceKv for SledKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.tree
            .get(key.as_bytes())
            .map(|v| v.map(|iv| iv.to_vec()))
            .map_err(|e| SeamError::Storage(e.to_string()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.tree
            .insert(key.as_bytes(), value)
            .map_err(|e| SeamError::Storage(e.to_string()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.tree
            .remove(key.as_bytes())
            .map_err(|e| SeamError::Storage(e.to_string()))?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self._db
            .flush()
            .map_err(|e| SeamError::Storage(e.to_string()))?;
        Ok(())
    }
}
