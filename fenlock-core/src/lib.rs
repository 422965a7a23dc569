//! # fenlock-core
//!
//! Client-side distributed mutual exclusion over a strongly-consistent
//! key-value store with conditional writes. Lease-based expiry without a
//! shared clock, fencing-token record versions, and a background heartbeat
//! task keeping held locks alive.

pub mod client;
pub mod error;
pub mod infrastructure;
#[path = "infrastructure_in_memory.rs"]
pub mod infrastructure_in_memory;
#[cfg(feature = "sqlite")]
#[path = "infrastructure_sqlite.rs"]
pub mod infrastructure_sqlite;
pub mod types;

mod engine;
mod scheduler;

pub use client::LockClient;
pub use error::{LockError, Result, StoreError};
pub use infrastructure::{LockStore, ReleasePolicy};
pub use infrastructure_in_memory::InMemoryLockStore;
#[cfg(feature = "sqlite")]
pub use infrastructure_sqlite::SqliteLockStore;
pub use types::{AcquireOptions, ClientOptions, LockHandle, LockRecord};

#[cfg(test)]
mod client_test;
