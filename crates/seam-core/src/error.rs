use thiserror::Error;

/// Result type alias for Seam operations.
pub type Result<T> = std::result::Result<T, SeamError>;

#[derive(Debug, Error, Clone)]
pub enum SeamError {
    // ── Claim validation ─────────────────────────────────────────────────────
    #[error("invalid claim amount: requested {requested}, available {available}")]
    InvalidAmount { requested: f64, available: f64 },

    #[error("claim cooldown active: {remaining_secs}s remaining")]
    CooldownActive { remaining_secs: i64 },

    #[error("a claim for this user is already in flight")]
    AlreadyInFlight,

    // ── Session lifecycle ────────────────────────────────────────────────────
    #[error("an active mining session already exists for this user")]
    SessionConflict,

    #[error("user is not eligible to mine: {reason}")]
    NotEligible { reason: String },

    // ── Store ────────────────────────────────────────────────────────────────
    /// The store rejected a write whose idempotency key already exists.
    /// Callers treat this as success-equivalent: the effect is present.
    #[error("duplicate idempotency key: {0}")]
    DuplicateKey(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Transient store/transport failure. Read-only calls are retried with
    /// backoff; writes are surfaced to the caller unretried.
    #[error("network error: {0}")]
    Network(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SeamError {
    /// True for transient failures that a read-only call may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// True for terminal validation errors that must surface immediately
    /// and never be retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount { .. }
                | Self::CooldownActive { .. }
                | Self::AlreadyInFlight
                | Self::SessionConflict
                | Self::NotEligible { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_errors_are_retryable() {
        assert!(SeamError::Network("timeout".into()).is_retryable());
        assert!(!SeamError::SessionConflict.is_retryable());
        assert!(!SeamError::DuplicateKey("k".into()).is_retryable());
    }

    #[test]
    fn validation_errors_are_terminal() {
        assert!(SeamError::AlreadyInFlight.is_validation());
        assert!(SeamError::CooldownActive { remaining_secs: 10 }.is_validation());
        assert!(!SeamError::Network("x".into()).is_validation());
    }
}
