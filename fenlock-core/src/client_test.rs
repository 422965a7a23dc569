#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use crate::client::LockClient;
    use crate::error::{LockError, StoreError};
    use crate::infrastructure::{LockStore, ReleasePolicy};
    use crate::infrastructure_in_memory::InMemoryLockStore;
    use crate::types::{AcquireOptions, ClientOptions, LockRecord, new_record_version};

    fn opts(owner: &str) -> ClientOptions {
        ClientOptions::new()
            .with_owner(owner)
            .with_lease_duration(Duration::from_secs(3))
            .with_heartbeat_period(Duration::from_secs(1))
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_get_observes_without_disturbing() {
        let store = Arc::new(InMemoryLockStore::new());
        let holder = LockClient::new(store.clone(), opts("enterprise-a")).unwrap();
        holder
            .acquire_with("kirk", AcquireOptions::new().with_data(b"x".to_vec()))
            .await
            .unwrap();
        let before = store.get_record("kirk").await.unwrap().unwrap();

        let observer = LockClient::new(store.clone(), opts("enterprise-b")).unwrap();
        let snapshot = observer.get("kirk").await.unwrap().unwrap();
        assert_eq!(snapshot.owner, "enterprise-a");
        assert_eq!(snapshot.data.as_deref(), Some(b"x".as_ref()));
        assert_eq!(snapshot.record_version, before.record_version);

        let after = store.get_record("kirk").await.unwrap().unwrap();
        assert_eq!(after, before);
        assert!(observer.get("absent").await.unwrap().is_none());

        observer.shutdown().await;
        holder.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_release_is_idempotent() {
        let store = Arc::new(InMemoryLockStore::new());
        let client = LockClient::new(store.clone(), opts("alpha")).unwrap();
        let handle = client.acquire("brig").await.unwrap();

        assert!(client.release(&handle).await.unwrap());
        assert!(!client.release(&handle).await.unwrap());

        assert!(store.get_record("brig").await.unwrap().is_none());
        assert!(handle.is_released().await);
        assert!(!handle.is_lost().await);
        assert!(client.held_keys().is_empty());

        client.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_release_with_tombstone_policy_keeps_the_record() {
        let store = Arc::new(InMemoryLockStore::new());
        let client = LockClient::new(
            store.clone(),
            opts("alpha").with_release_policy(ReleasePolicy::MarkReleased),
        )
        .unwrap();
        let handle = client
            .acquire_with("brig", AcquireOptions::new().with_data(b"payload".to_vec()))
            .await
            .unwrap();
        let version = handle.record_version().await;

        assert!(client.release(&handle).await.unwrap());

        let stored = store.get_record("brig").await.unwrap().unwrap();
        assert!(stored.released);
        assert_eq!(stored.owner, "alpha");
        assert_eq!(stored.record_version, version);
        assert_eq!(stored.data.as_deref(), Some(b"payload".as_ref()));

        client.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_release_after_takeover_reports_false() {
        let store = Arc::new(InMemoryLockStore::new());
        let client = LockClient::new(store.clone(), opts("alpha")).unwrap();
        let handle = client.acquire("contest").await.unwrap();

        let stored = store.get_record("contest").await.unwrap().unwrap();
        let raider = LockRecord {
            owner: "raider".to_string(),
            record_version: new_record_version(),
            ..stored.clone()
        };
        store
            .put_record_if_version_matches(&stored.record_version, raider.clone())
            .await
            .unwrap();

        assert!(!client.release(&handle).await.unwrap());
        assert!(handle.is_lost().await);
        assert!(client.held_keys().is_empty());

        let after = store.get_record("contest").await.unwrap().unwrap();
        assert_eq!(after.owner, "raider");

        client.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_release_survives_a_store_outage() {
        let store = Arc::new(OutageStore::new());
        let client = LockClient::new(store.clone(), opts("alpha")).unwrap();
        let handle = client.acquire("brig").await.unwrap();

        store.down.store(true, Ordering::SeqCst);
        let err = client.release(&handle).await.unwrap_err();
        assert!(matches!(err, LockError::Unavailable(_)));
        // Still held locally; the caller may retry
        assert!(handle.is_held().await);
        assert_eq!(client.held_keys(), vec!["brig".to_string()]);

        store.down.store(false, Ordering::SeqCst);
        assert!(client.release(&handle).await.unwrap());
        assert!(store.inner.get_record("brig").await.unwrap().is_none());

        client.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_shutdown_releases_held_locks() {
        let store = Arc::new(InMemoryLockStore::new());
        let client = LockClient::new(store.clone(), opts("alpha")).unwrap();
        let first = client.acquire("k1").await.unwrap();
        let second = client.acquire("k2").await.unwrap();

        client.shutdown().await;
        assert!(store.get_record("k1").await.unwrap().is_none());
        assert!(store.get_record("k2").await.unwrap().is_none());
        assert!(first.is_released().await);
        assert!(second.is_released().await);
        assert!(client.held_keys().is_empty());

        // Idempotent, and the client stays refusing new work
        client.shutdown().await;
        let err = client.acquire("k3").await.unwrap_err();
        assert!(matches!(err, LockError::Shutdown));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_shutdown_can_leave_locks_in_place() {
        let store = Arc::new(InMemoryLockStore::new());
        let client = LockClient::new(
            store.clone(),
            opts("alpha").with_release_on_shutdown(false),
        )
        .unwrap();
        client.acquire("keep").await.unwrap();

        client.shutdown().await;
        let stored = store.get_record("keep").await.unwrap().unwrap();
        assert_eq!(stored.owner, "alpha");
        assert!(!stored.released);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_reentrant_acquire_from_a_new_client() {
        let store = Arc::new(InMemoryLockStore::new());
        let crew = "kirk-crew";
        let first = LockClient::new(
            store.clone(),
            opts(crew).with_release_on_shutdown(false),
        )
        .unwrap();
        first.acquire("spock").await.unwrap();
        // The process dies without releasing; its successor keeps the identity
        first.shutdown().await;

        let second = LockClient::new(store.clone(), opts(crew)).unwrap();
        let started = Instant::now();
        let handle = second
            .acquire_with("spock", AcquireOptions::new().with_reentrant(true))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(handle.owner(), crew);
        assert!(handle.is_held().await);

        second.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_reacquiring_a_key_supersedes_the_old_handle() {
        let store = Arc::new(InMemoryLockStore::new());
        let client = LockClient::new(store.clone(), opts("alpha")).unwrap();
        let first = client.acquire("twice").await.unwrap();
        let second = client
            .acquire_with("twice", AcquireOptions::new().with_reentrant(true))
            .await
            .unwrap();

        assert!(first.is_lost().await);
        assert!(second.is_held().await);
        assert_eq!(client.held_keys(), vec!["twice".to_string()]);

        client.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_locks_on_distinct_keys_are_independent() {
        let store = Arc::new(InMemoryLockStore::new());
        let first = LockClient::new(store.clone(), opts("alpha")).unwrap();
        let second = LockClient::new(store.clone(), opts("bravo")).unwrap();

        first.acquire("alpha-key").await.unwrap();
        let handle = second
            .acquire_with("beta-key", AcquireOptions::new().with_timeout(Duration::ZERO))
            .await
            .unwrap();
        assert!(handle.is_held().await);

        second.shutdown().await;
        first.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_acquire_lease_override_lands_in_the_record() {
        let store = Arc::new(InMemoryLockStore::new());
        let client = LockClient::new(store.clone(), opts("alpha")).unwrap();
        client
            .acquire_with(
                "orders",
                AcquireOptions::new().with_lease_duration(Duration::from_secs(7)),
            )
            .await
            .unwrap();

        let stored = store.get_record("orders").await.unwrap().unwrap();
        assert_eq!(stored.lease_duration_ms, 7_000);

        client.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_invalid_options_are_rejected() {
        assert!(matches!(
            LockClient::in_memory(ClientOptions::new().with_owner("")),
            Err(LockError::Config(_))
        ));
        assert!(matches!(
            LockClient::in_memory(
                ClientOptions::new()
                    .with_lease_duration(Duration::from_secs(2))
                    .with_heartbeat_period(Duration::from_secs(2)),
            ),
            Err(LockError::Config(_))
        ));
        assert!(matches!(
            LockClient::in_memory(
                ClientOptions::new().with_heartbeat_period(Duration::ZERO),
            ),
            Err(LockError::Config(_))
        ));
        assert!(matches!(
            LockClient::in_memory(ClientOptions::new().with_max_heartbeat_failures(0)),
            Err(LockError::Config(_))
        ));
        assert!(matches!(
            LockClient::in_memory(
                ClientOptions::new()
                    .with_lease_duration(Duration::from_secs(4))
                    .with_heartbeat_period(Duration::from_secs(1))
                    .with_heartbeat_call_timeout(Duration::from_secs(1)),
            ),
            Err(LockError::Config(_))
        ));

        let client = LockClient::in_memory(opts("alpha")).unwrap();
        assert!(matches!(
            client.acquire("").await,
            Err(LockError::Config(_))
        ));
        assert!(matches!(
            client
                .acquire_with(
                    "orders",
                    AcquireOptions::new().with_lease_duration(Duration::ZERO),
                )
                .await,
            Err(LockError::Config(_))
        ));

        client.shutdown().await;
    }

    // ─── Test Stores ────────────────────────────────────────────────────────

    /// Refuses releases while `down` is set.
    struct OutageStore {
        inner: InMemoryLockStore,
        down: AtomicBool,
    }

    impl OutageStore {
        fn new() -> Self {
            Self {
                inner: InMemoryLockStore::new(),
                down: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl LockStore for OutageStore {
        async fn get_record(&self, key: &str) -> Result<Option<LockRecord>, StoreError> {
            self.inner.get_record(key).await
        }

        async fn put_record_if_absent(&self, record: LockRecord) -> Result<(), StoreError> {
            self.inner.put_record_if_absent(record).await
        }

        async fn put_record_if_version_matches(
            &self,
            expected_version: &str,
            record: LockRecord,
        ) -> Result<(), StoreError> {
            self.inner
                .put_record_if_version_matches(expected_version, record)
                .await
        }

        async fn delete_or_mark_released_if_version_matches(
            &self,
            key: &str,
            expected_version: &str,
            policy: ReleasePolicy,
        ) -> Result<(), StoreError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("simulated outage".to_string()));
            }
            self.inner
                .delete_or_mark_released_if_version_matches(key, expected_version, policy)
                .await
        }
    }
}
