//! The mining reward engine: session lifecycle, accrual math, the claim
//! gate, streak rewards and offline reconciliation, all over an abstract
//! `RewardStore` and an injectable clock.

pub mod accrual;
pub mod claim;
pub mod lifecycle;
pub mod reconcile;
pub mod retry;
pub mod streak;

pub use claim::{ClaimGate, ClaimReceipt};
pub use lifecycle::SessionManager;
pub use reconcile::{ReconcileReport, Reconciler, ResumeSnapshot};
pub use retry::RetryPolicy;
pub use streak::{StreakOutcome, StreakTracker};
