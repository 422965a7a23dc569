//! The heartbeat scheduler: one background task per client that refreshes
//! the record version of every held lock before its lease runs out.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tracing::{debug, trace, warn};

use crate::client::ClientInner;
use crate::error::StoreError;
use crate::types::{HandleState, LockRecord, new_record_version};

/// Starts the heartbeat loop. The task holds only a weak reference to the
/// client, so dropping every client clone winds the loop down on its own;
/// an explicit stop arrives through the watch channel.
pub(crate) fn spawn(
    client: Weak<ClientInner>,
    period: Duration,
    mut stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // First tick one full period in, once construction has finished.
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(inner) = client.upgrade() else { break };
                    run_tick(&inner).await;
                }
                _ = stop_rx.changed() => break,
            }
        }
        debug!("heartbeat loop stopped");
    })
}

/// One scheduler pass over every held handle. Sequential, but each store
/// call is bounded by the per-call timeout so one slow key cannot starve
/// the rest of a tick.
pub(crate) async fn run_tick(inner: &ClientInner) {
    // Snapshot the entries up front; no map lock is held across awaits.
    let held: Vec<(String, Arc<Mutex<HandleState>>)> = inner
        .held
        .iter()
        .map(|e| (e.key().clone(), Arc::clone(e.value())))
        .collect();

    for (key, state) in held {
        beat_one(inner, &key, &state).await;
    }
}

async fn beat_one(inner: &ClientInner, key: &str, state_arc: &Arc<Mutex<HandleState>>) {
    let mut state = state_arc.lock().await;
    if state.released || state.lost {
        return;
    }

    let expected = state.record_version.clone();
    let next_version = new_record_version();
    let record = LockRecord {
        key: key.to_string(),
        owner: inner.options.owner.clone(),
        record_version: next_version.clone(),
        lease_duration_ms: state.lease_duration_ms,
        data: state.data.clone(),
        released: false,
        // Heartbeats refresh the lease, not the acquisition: the creation
        // stamp passes through untouched.
        created_at_ms: state.created_at_ms,
    };

    let attempt = timeout(
        inner.options.heartbeat_call_timeout(),
        inner.store.put_record_if_version_matches(&expected, record),
    )
    .await;

    match attempt {
        Ok(Ok(())) => {
            state.record_version = next_version;
            state.heartbeat_failures = 0;
            trace!(key, "lease refreshed");
        }
        Ok(Err(StoreError::ConditionFailed)) => {
            state.lost = true;
            drop(state);
            remove_handle(inner, key, state_arc);
            warn!(key, "lock lost: another holder took over");
        }
        Ok(Err(StoreError::Unavailable(reason))) => {
            note_failure(inner, key, state, state_arc, &reason);
        }
        Err(_) => {
            note_failure(inner, key, state, state_arc, "heartbeat call timed out");
        }
    }
}

/// Transient failures are tolerated up to the configured cap; past it the
/// client can no longer prove it still holds the lock and gives the handle
/// up conservatively.
fn note_failure(
    inner: &ClientInner,
    key: &str,
    mut state: MutexGuard<'_, HandleState>,
    state_arc: &Arc<Mutex<HandleState>>,
    reason: &str,
) {
    state.heartbeat_failures += 1;
    let failures = state.heartbeat_failures;
    if failures >= inner.options.max_heartbeat_failures {
        state.lost = true;
        drop(state);
        remove_handle(inner, key, state_arc);
        warn!(key, failures, reason, "possession can no longer be proven; marking lost");
    } else {
        warn!(key, failures, reason, "heartbeat attempt failed; retrying next tick");
    }
}

fn remove_handle(inner: &ClientInner, key: &str, state_arc: &Arc<Mutex<HandleState>>) {
    // Guard against racing a re-acquire that replaced the entry.
    inner
        .held
        .remove_if(key, |_, v| Arc::ptr_eq(v, state_arc));
}
