//! seam-core
//!
//! Shared data model for the Seam time-mining reward system: typed
//! identifiers, protocol constants, the error enum, the injectable clock,
//! and the session/ledger/streak records.

pub mod clock;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod session;
pub mod streak;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use constants::*;
pub use error::{Result, SeamError};
pub use ledger::*;
pub use session::*;
pub use streak::StreakState;
pub use types::*;
