use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

/// Reward amount in token units. Accrual is fractional (base daily rate
/// divided over 86_400 seconds), so amounts are f64 rather than an integer
/// base unit; equality comparisons go through `amounts_close`.
pub type Amount = f64;

/// Tolerance used when comparing ledger amounts for near-equality.
pub fn amounts_close(a: Amount, b: Amount, tolerance: Amount) -> bool {
    (a - b).abs() <= tolerance
}

// ── UserId ───────────────────────────────────────────────────────────────────

/// Opaque user identifier issued by the out-of-scope identity layer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

// ── SessionId ────────────────────────────────────────────────────────────────

/// 16-byte mining session identifier, random at session creation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub [u8; 16]);

impl SessionId {
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn from_bytes(b: [u8; 16]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({}…)", &self.to_hex()[..8])
    }
}

// ── EntryId ──────────────────────────────────────────────────────────────────

/// 16-byte ledger entry identifier, assigned by the store on append.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub [u8; 16]);

impl EntryId {
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({}…)", &self.to_hex()[..8])
    }
}

// ── IdempotencyKey ───────────────────────────────────────────────────────────

/// 32-byte idempotency discriminator: BLAKE3 over
/// `(user || session || label || period)`.
///
/// The store enforces uniqueness on this key, which is what makes claim,
/// rollover and offline-credit writes safe to re-invoke (a second append
/// with the same key fails with `DuplicateKey`, which callers treat as
/// success-equivalent).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(pub [u8; 32]);

impl IdempotencyKey {
    /// Derive a key from the semantic identity of a write.
    ///
    /// `label` names the write kind ("claim", "complete", "offline",
    /// "streak"); `period` is the period boundary that makes two writes
    /// for the same real-world accrual collide (cooldown slot, session
    /// end, offline interval end, UTC day).
    pub fn derive(user: &UserId, session: Option<&SessionId>, label: &str, period: i64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(user.as_str().as_bytes());
        if let Some(sid) = session {
            hasher.update(sid.as_bytes());
        }
        hasher.update(label.as_bytes());
        hasher.update(&period.to_le_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdempotencyKey({}…)", &self.to_hex()[..16])
    }
}
