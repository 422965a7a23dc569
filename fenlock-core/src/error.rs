//! Error types for the fenlock client.

use std::time::Duration;

/// Failure of a single backing-store operation.
///
/// `ConditionFailed` is protocol currency: acquisition retries it and the
/// heartbeat/release paths convert it into lock loss. It is never returned
/// from the public client API.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A conditional write found its precondition no longer holds.
    #[error("conditional write precondition failed")]
    ConditionFailed,

    /// The store could not serve the request right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// True when the error is the atomic lost-a-race signal.
    pub fn is_condition_failed(&self) -> bool {
        matches!(self, StoreError::ConditionFailed)
    }
}

/// Error type for lock client operations.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Acquisition exhausted its timeout budget without winning the lock.
    #[error("lock not granted for {key:?} after {waited:?}")]
    NotGranted { key: String, waited: Duration },

    /// The handle no longer holds the lock: it was released, or another
    /// process took over.
    #[error("lock {key:?} is no longer held")]
    Lost { key: String },

    /// Transient backing-store failure; the operation may be retried.
    #[error("backing store unavailable")]
    Unavailable(#[source] StoreError),

    /// Rejected client or acquire options.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The client has been shut down and accepts no new acquisitions.
    #[error("lock client is shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, LockError>;
