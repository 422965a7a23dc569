use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::{LockError, Result};
use crate::types::record::LockRecord;

/// Mutable per-lock state shared between a handle, the owning client's held
/// set, and the heartbeat scheduler. Acquisition, release, and heartbeat
/// ticks all mutate it under the mutex, never concurrently.
#[derive(Debug)]
pub(crate) struct HandleState {
    /// Last version this client successfully wrote for the lock
    pub record_version: String,
    pub lease_duration_ms: u64,
    pub data: Option<Vec<u8>>,
    pub created_at_ms: Option<u64>,
    /// Set by an explicit release through this client
    pub released: bool,
    /// Set when a conditional write discovered another holder, or when
    /// heartbeats failed long enough that possession can no longer be proven
    pub lost: bool,
    /// Consecutive heartbeat attempts that hit a transient store failure
    pub heartbeat_failures: u32,
}

impl HandleState {
    pub fn from_record(record: &LockRecord) -> Self {
        Self {
            record_version: record.record_version.clone(),
            lease_duration_ms: record.lease_duration_ms,
            data: record.data.clone(),
            created_at_ms: record.created_at_ms,
            released: false,
            lost: false,
            heartbeat_failures: 0,
        }
    }
}

/// In-process handle to an acquired lock.
///
/// Handles are cheap to clone and share their state; dropping one does not
/// release the lock. A handle stays valid until released through its client,
/// lost to another holder, or invalidated by client shutdown.
#[derive(Debug, Clone)]
pub struct LockHandle {
    key: String,
    owner: String,
    state: Arc<Mutex<HandleState>>,
}

impl LockHandle {
    pub(crate) fn new(key: String, owner: String, state: Arc<Mutex<HandleState>>) -> Self {
        Self { key, owner, state }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The lease duration this lock was acquired with.
    pub async fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.state.lock().await.lease_duration_ms)
    }

    /// The fencing token from the last successful write for this lock.
    /// Changes on every heartbeat; pass it to downstream systems that need
    /// to reject writes from stale holders.
    pub async fn record_version(&self) -> String {
        self.state.lock().await.record_version.clone()
    }

    /// The payload currently attached to the lock record.
    pub async fn data(&self) -> Option<Vec<u8>> {
        self.state.lock().await.data.clone()
    }

    /// True when this handle was released through its client.
    pub async fn is_released(&self) -> bool {
        self.state.lock().await.released
    }

    /// True when the lock was taken over by another holder or heartbeats
    /// degraded past the failure limit.
    pub async fn is_lost(&self) -> bool {
        self.state.lock().await.lost
    }

    /// True while the lock is still held: neither released nor lost.
    pub async fn is_held(&self) -> bool {
        let state = self.state.lock().await;
        !state.released && !state.lost
    }

    /// Errors with [`LockError::Lost`] unless the lock is still held.
    /// Call before acting on the protected resource.
    pub async fn ensure_held(&self) -> Result<()> {
        if self.is_held().await {
            Ok(())
        } else {
            Err(LockError::Lost {
                key: self.key.clone(),
            })
        }
    }

    pub(crate) fn state(&self) -> &Arc<Mutex<HandleState>> {
        &self.state
    }
}
