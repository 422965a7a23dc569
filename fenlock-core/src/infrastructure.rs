use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::LockRecord;

/// What a release leaves behind in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleasePolicy {
    /// Remove the record entirely; the next acquirer takes the create path
    Delete,
    /// Keep the record with `released` set, so observers see an explicit
    /// release rather than an absent key
    MarkReleased,
}

/// Contract for lock record storage backends.
///
/// The conditional operations are the protocol's only coordination
/// primitive: each must be atomic against concurrent calls for the same key,
/// and among conditional writes sharing an expected version at most one may
/// ever succeed. Everything else about the protocol is built on that.
///
/// A precondition miss is reported as [`StoreError::ConditionFailed`];
/// anything else (connectivity, timeouts, backend faults) as
/// [`StoreError::Unavailable`].
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Plain read of the current record, `None` when the key has none.
    async fn get_record(&self, key: &str) -> Result<Option<LockRecord>, StoreError>;

    /// Insert a record for `record.key`, failing the condition when any
    /// record already exists for that key.
    async fn put_record_if_absent(&self, record: LockRecord) -> Result<(), StoreError>;

    /// Replace the record for `record.key`, failing the condition when the
    /// stored version differs from `expected_version` or the record is
    /// absent.
    async fn put_record_if_version_matches(
        &self,
        expected_version: &str,
        record: LockRecord,
    ) -> Result<(), StoreError>;

    /// Delete the record or mark it released per `policy`, failing the
    /// condition when the stored version differs from `expected_version` or
    /// the record is absent.
    async fn delete_or_mark_released_if_version_matches(
        &self,
        key: &str,
        expected_version: &str,
        policy: ReleasePolicy,
    ) -> Result<(), StoreError>;
}
