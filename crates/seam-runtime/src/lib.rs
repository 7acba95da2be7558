//! Cooperative single-event-loop runtime for the mining reward engine:
//! named cancellable tasks, an on-device cache mirror, a sync rate limiter
//! and the miner runtime that wires them to the engine.

pub mod cache;
pub mod config;
pub mod limiter;
pub mod runtime;
pub mod scheduler;

pub use cache::CacheMirror;
pub use config::RuntimeConfig;
pub use limiter::SyncRateLimiter;
pub use runtime::{DisplayState, MinerRuntime};
pub use scheduler::TaskScheduler;
