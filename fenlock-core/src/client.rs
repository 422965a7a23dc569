//! High-level lock client binding configuration, the acquisition engine,
//! and the heartbeat scheduler. Owns the set of locks it currently holds.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{self, AcquireRequest};
use crate::error::{LockError, Result, StoreError};
use crate::infrastructure::LockStore;
use crate::infrastructure_in_memory::InMemoryLockStore;
use crate::scheduler;
use crate::types::{AcquireOptions, ClientOptions, HandleState, LockHandle, LockRecord};

/// State shared between client clones and the heartbeat task.
pub(crate) struct ClientInner {
    pub store: Arc<dyn LockStore>,
    pub options: ClientOptions,
    /// Locks this client currently holds, keyed by lock key
    pub held: DashMap<String, Arc<Mutex<HandleState>>>,
    pub shut_down: AtomicBool,
    pub stop_tx: watch::Sender<bool>,
    pub heartbeat_task: Mutex<Option<JoinHandle<()>>>,
}

/// The main entry point. One client per owner identity; clones share the
/// held-lock set and the single background heartbeat task.
///
/// Explicit lifecycle: created with [`LockClient::new`], wound down with
/// [`LockClient::shutdown`]. Dropping every clone without shutdown also
/// stops the heartbeat task, but skips the optional release of held locks.
#[derive(Clone)]
pub struct LockClient {
    inner: Arc<ClientInner>,
}

impl LockClient {
    /// Create a client over the given store and start its heartbeat task.
    /// Must be called from within a Tokio runtime.
    pub fn new(store: Arc<dyn LockStore>, options: ClientOptions) -> Result<Self> {
        options.validate()?;
        let period = options.heartbeat_period();
        let (stop_tx, stop_rx) = watch::channel(false);
        let inner = Arc::new_cyclic(|weak| ClientInner {
            store,
            options,
            held: DashMap::new(),
            shut_down: AtomicBool::new(false),
            stop_tx,
            heartbeat_task: Mutex::new(Some(scheduler::spawn(weak.clone(), period, stop_rx))),
        });
        Ok(Self { inner })
    }

    /// Create a client over a fresh in-memory store. Coordinates tasks
    /// within this process only.
    pub fn in_memory(options: ClientOptions) -> Result<Self> {
        Self::new(Arc::new(InMemoryLockStore::new()), options)
    }

    /// Create a client backed by SQLite at the given path. Records persist
    /// across restarts and coordinate processes sharing the file.
    #[cfg(feature = "sqlite")]
    pub fn with_sqlite(path: &str, options: ClientOptions) -> Result<Self> {
        let store =
            crate::infrastructure_sqlite::SqliteLockStore::open(path).map_err(LockError::Unavailable)?;
        Self::new(Arc::new(store), options)
    }

    /// The owner identity this client writes into records.
    pub fn owner(&self) -> &str {
        &self.inner.options.owner
    }

    /// Acquire the lock for `key` with the client's default options.
    pub async fn acquire(&self, key: &str) -> Result<LockHandle> {
        self.acquire_with(key, AcquireOptions::default()).await
    }

    /// Acquire the lock for `key`, blocking up to the acquisition timeout
    /// while a live holder keeps refreshing its lease. The returned handle
    /// is heartbeated until released, lost, or client shutdown.
    ///
    /// Cancelling the future at any point leaves no record mutation behind.
    pub async fn acquire_with(&self, key: &str, options: AcquireOptions) -> Result<LockHandle> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(LockError::Shutdown);
        }
        if key.is_empty() {
            return Err(LockError::Config("lock key must not be empty".into()));
        }
        options.validate()?;

        let lease = options
            .lease_duration
            .unwrap_or(self.inner.options.lease_duration);
        let timeout = options
            .timeout
            .unwrap_or_else(|| self.inner.options.acquire_timeout());

        let record = engine::acquire(AcquireRequest {
            store: self.inner.store.as_ref(),
            key,
            owner: &self.inner.options.owner,
            lease_duration_ms: lease.as_millis() as u64,
            timeout,
            data: options.data,
            replace_data: options.replace_data,
            reentrant: options.reentrant,
            local_clock_bypass: options.local_clock_bypass,
            stamp_created: self.inner.options.track_created_time,
        })
        .await?;

        debug!(
            key,
            owner = %self.inner.options.owner,
            version = %record.record_version,
            "lock acquired"
        );
        Ok(self.register(record).await)
    }

    /// Release a held lock.
    ///
    /// `Ok(true)` when this call released it; `Ok(false)` when there was
    /// nothing left to release (already released, already lost, or another
    /// holder had taken over — the handle is then marked lost). A store
    /// outage keeps the handle held and heartbeating so release can be
    /// retried.
    pub async fn release(&self, handle: &LockHandle) -> Result<bool> {
        let mut state = handle.state().lock().await;
        if state.released || state.lost {
            return Ok(false);
        }

        let result = self
            .inner
            .store
            .delete_or_mark_released_if_version_matches(
                handle.key(),
                &state.record_version,
                self.inner.options.release_policy,
            )
            .await;

        match result {
            Ok(()) => {
                state.released = true;
                drop(state);
                self.remove(handle);
                debug!(key = handle.key(), "lock released");
                Ok(true)
            }
            Err(StoreError::ConditionFailed) => {
                state.lost = true;
                drop(state);
                self.remove(handle);
                warn!(key = handle.key(), "release found another holder; handle marked lost");
                Ok(false)
            }
            Err(e) => Err(LockError::Unavailable(e)),
        }
    }

    /// Read the current record for `key` without touching lease state.
    /// Purely observational; never issues a conditional write.
    pub async fn get(&self, key: &str) -> Result<Option<LockRecord>> {
        self.inner
            .store
            .get_record(key)
            .await
            .map_err(LockError::Unavailable)
    }

    /// Keys of the locks this client currently holds.
    pub fn held_keys(&self) -> Vec<String> {
        self.inner.held.iter().map(|e| e.key().clone()).collect()
    }

    /// Stop the heartbeat task, then release every held, non-lost lock when
    /// `release_on_shutdown` is set. Release failures are logged, never
    /// returned. Idempotent; later calls return immediately.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.stop_tx.send(true);
        if let Some(task) = self.inner.heartbeat_task.lock().await.take() {
            if task.await.is_err() {
                warn!("heartbeat task ended abnormally");
            }
        }
        if self.inner.options.release_on_shutdown {
            self.release_all().await;
        }
        info!(owner = %self.inner.options.owner, "lock client shut down");
    }

    // ─── Held-set Maintenance ───────────────────────────────────────────────

    /// Wrap a freshly won record into a handle and start heartbeating it.
    async fn register(&self, record: LockRecord) -> LockHandle {
        let state = Arc::new(Mutex::new(HandleState::from_record(&record)));
        if let Some(previous) = self
            .inner
            .held
            .insert(record.key.clone(), Arc::clone(&state))
        {
            // Re-acquiring a key we already hold supersedes the old handle;
            // only one handle per key is ever refreshed.
            previous.lock().await.lost = true;
            warn!(key = %record.key, "superseded a previously held handle for this key");
        }
        LockHandle::new(record.key, self.inner.options.owner.clone(), state)
    }

    fn remove(&self, handle: &LockHandle) {
        self.inner
            .held
            .remove_if(handle.key(), |_, v| Arc::ptr_eq(v, handle.state()));
    }

    /// Best-effort release of everything still held, for shutdown. Handles
    /// that cannot be released are marked lost; without heartbeats the
    /// client could not defend them anyway.
    async fn release_all(&self) {
        let held: Vec<(String, Arc<Mutex<HandleState>>)> = self
            .inner
            .held
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        for (key, state_arc) in held {
            let mut state = state_arc.lock().await;
            if !state.released && !state.lost {
                match self
                    .inner
                    .store
                    .delete_or_mark_released_if_version_matches(
                        &key,
                        &state.record_version,
                        self.inner.options.release_policy,
                    )
                    .await
                {
                    Ok(()) => {
                        state.released = true;
                        debug!(key = %key, "lock released at shutdown");
                    }
                    Err(StoreError::ConditionFailed) => {
                        state.lost = true;
                        warn!(key = %key, "lock already taken over at shutdown");
                    }
                    Err(e) => {
                        state.lost = true;
                        warn!(key = %key, error = %e, "release failed at shutdown; marking lost");
                    }
                }
            }
            drop(state);
            self.inner
                .held
                .remove_if(&key, |_, v| Arc::ptr_eq(v, &state_arc));
        }
    }
}
