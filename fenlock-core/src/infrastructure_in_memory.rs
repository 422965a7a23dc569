use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::StoreError;
use crate::infrastructure::{LockStore, ReleasePolicy};
use crate::types::LockRecord;

/// Process-local lock store backed by a concurrent map.
///
/// Conditional semantics come from the map's per-entry locking: every check
/// and write below happens while holding the entry. Suited to tests and to
/// coordinating tasks inside one process.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    records: DashMap<String, LockRecord>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently stored, released tombstones included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn get_record(&self, key: &str) -> Result<Option<LockRecord>, StoreError> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn put_record_if_absent(&self, record: LockRecord) -> Result<(), StoreError> {
        match self.records.entry(record.key.clone()) {
            Entry::Occupied(_) => Err(StoreError::ConditionFailed),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn put_record_if_version_matches(
        &self,
        expected_version: &str,
        record: LockRecord,
    ) -> Result<(), StoreError> {
        match self.records.get_mut(&record.key) {
            Some(mut current) if current.record_version == expected_version => {
                *current = record;
                Ok(())
            }
            _ => Err(StoreError::ConditionFailed),
        }
    }

    async fn delete_or_mark_released_if_version_matches(
        &self,
        key: &str,
        expected_version: &str,
        policy: ReleasePolicy,
    ) -> Result<(), StoreError> {
        match policy {
            ReleasePolicy::Delete => {
                let removed = self
                    .records
                    .remove_if(key, |_, r| r.record_version == expected_version);
                if removed.is_some() {
                    Ok(())
                } else {
                    Err(StoreError::ConditionFailed)
                }
            }
            ReleasePolicy::MarkReleased => match self.records.get_mut(key) {
                Some(mut current) if current.record_version == expected_version => {
                    current.released = true;
                    Ok(())
                }
                _ => Err(StoreError::ConditionFailed),
            },
        }
    }
}
