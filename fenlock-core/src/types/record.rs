use serde::{Deserialize, Serialize};

/// The durable representation of a lock in the backing store, one per key.
///
/// Expiry is never stored: a record is expired exactly when its
/// `record_version` has been observed unchanged across a full
/// `lease_duration_ms` interval, so no two machines ever compare clocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Unique lock identifier
    pub key: String,
    /// Opaque identity of the holder, set on each successful acquisition
    pub owner: String,
    /// Fencing token, regenerated on every successful acquisition or heartbeat
    pub record_version: String,
    /// Lease duration chosen by the acquirer; relative, never an absolute time
    pub lease_duration_ms: u64,
    /// Optional opaque payload associated with the lock
    pub data: Option<Vec<u8>>,
    /// True when the holder released explicitly (distinct from lease expiry)
    pub released: bool,
    /// Wall-clock millis of the most recent acquisition, written only when
    /// the client enables it; consumed only by the local-clock bypass
    pub created_at_ms: Option<u64>,
}

impl LockRecord {
    pub fn new(
        key: String,
        owner: String,
        lease_duration_ms: u64,
        data: Option<Vec<u8>>,
        created_at_ms: Option<u64>,
    ) -> Self {
        Self {
            key,
            owner,
            record_version: new_record_version(),
            lease_duration_ms,
            data,
            released: false,
            created_at_ms,
        }
    }
}

/// Generates a fresh fencing token. 21 url-safe chars of entropy, so equal
/// versions identify the exact same write.
pub(crate) fn new_record_version() -> String {
    nanoid::nanoid!()
}
