//! seam-store
//!
//! The authoritative reward/session store interface plus two
//! implementations (in-memory reference and sled-backed), and the minimal
//! on-device key/value store used for local snapshots.

pub mod kv;
pub mod memory;
pub mod sled_store;
pub mod store;

pub use kv::{DeviceKv, MemoryKv, SledKv};
pub use memory::MemoryStore;
pub use sled_store::SledStore;
pub use store::{Eligibility, RewardStore};
