//! The acquisition engine: read, bypass checks, lease wait, conditional
//! takeover. Pure protocol against a [`LockStore`]; handle registration and
//! heartbeating live in the client.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

use crate::error::{LockError, Result, StoreError};
use crate::infrastructure::LockStore;
use crate::types::{LockRecord, new_record_version};

/// One acquisition attempt, fully resolved from client and per-call options.
pub(crate) struct AcquireRequest<'a> {
    pub store: &'a dyn LockStore,
    pub key: &'a str,
    pub owner: &'a str,
    pub lease_duration_ms: u64,
    /// Overall budget; zero means a single immediate attempt
    pub timeout: Duration,
    pub data: Option<Vec<u8>>,
    pub replace_data: bool,
    pub reentrant: bool,
    pub local_clock_bypass: bool,
    pub stamp_created: bool,
}

/// The version last seen on the contended record and when this acquisition
/// first saw it. Expiry requires the same version to persist for the
/// record's full lease, measured on our monotonic clock.
struct Observed {
    version: String,
    first_seen: Instant,
}

/// Runs the acquisition protocol until the lock is won or the timeout
/// budget runs out.
///
/// Never mutates the store except through its final conditional write, so
/// cancelling the returned future at any await point leaves no trace.
/// Store outages surface immediately; only lost conditional races are
/// retried, within the budget.
pub(crate) async fn acquire(req: AcquireRequest<'_>) -> Result<LockRecord> {
    let started = Instant::now();
    let deadline = started.checked_add(req.timeout);
    let mut observed: Option<Observed> = None;

    loop {
        let current = req
            .store
            .get_record(req.key)
            .await
            .map_err(LockError::Unavailable)?;

        match current {
            None => {
                let record = build_record(&req, None);
                match req.store.put_record_if_absent(record.clone()).await {
                    Ok(()) => return Ok(record),
                    Err(StoreError::ConditionFailed) => {
                        // Lost the creation race; re-read whoever won.
                        debug!(key = req.key, "creation race lost");
                        observed = None;
                    }
                    Err(e) => return Err(LockError::Unavailable(e)),
                }
            }
            Some(current) => {
                if can_bypass_wait(&req, &current) {
                    match try_takeover(&req, &current).await? {
                        Some(record) => return Ok(record),
                        None => observed = None,
                    }
                } else {
                    let lease = Duration::from_millis(current.lease_duration_ms);
                    let first_seen = match &observed {
                        Some(o) if o.version == current.record_version => o.first_seen,
                        _ => {
                            let now = Instant::now();
                            observed = Some(Observed {
                                version: current.record_version.clone(),
                                first_seen: now,
                            });
                            now
                        }
                    };

                    let unchanged_for = first_seen.elapsed();
                    if unchanged_for >= lease {
                        // The holder went a full lease without refreshing.
                        debug!(key = req.key, "observed version expired; attempting takeover");
                        match try_takeover(&req, &current).await? {
                            Some(record) => return Ok(record),
                            None => observed = None,
                        }
                    } else {
                        let budget = remaining(deadline);
                        if budget.is_zero() {
                            return Err(not_granted(&req, started));
                        }
                        let wait = (lease - unchanged_for).min(budget);
                        trace!(
                            key = req.key,
                            wait_ms = wait.as_millis() as u64,
                            "holder alive; waiting out its lease"
                        );
                        sleep(wait).await;
                    }
                }
            }
        }

        if remaining(deadline).is_zero() {
            return Err(not_granted(&req, started));
        }
    }
}

// ─── Protocol Steps ─────────────────────────────────────────────────────────

/// Released records, our own records (when reentrancy is requested), and
/// wall-clock-expired records (when the unsafe bypass is requested) skip the
/// lease wait entirely.
fn can_bypass_wait(req: &AcquireRequest<'_>, current: &LockRecord) -> bool {
    if current.released {
        return true;
    }
    if req.reentrant && current.owner == req.owner {
        return true;
    }
    if req.local_clock_bypass {
        if let Some(created) = current.created_at_ms {
            return created.saturating_add(current.lease_duration_ms) < now_ms();
        }
    }
    false
}

/// Conditional write against the version we decided is expired. `None`
/// means somebody else won the same race first.
async fn try_takeover(
    req: &AcquireRequest<'_>,
    current: &LockRecord,
) -> Result<Option<LockRecord>> {
    let record = build_record(req, Some(current));
    match req
        .store
        .put_record_if_version_matches(&current.record_version, record.clone())
        .await
    {
        Ok(()) => Ok(Some(record)),
        Err(StoreError::ConditionFailed) => {
            debug!(key = req.key, "takeover lost the version race");
            Ok(None)
        }
        Err(e) => Err(LockError::Unavailable(e)),
    }
}

fn build_record(req: &AcquireRequest<'_>, prior: Option<&LockRecord>) -> LockRecord {
    // An existing payload survives the takeover unless the caller asked to
    // replace it.
    let data = match prior {
        Some(p) if !req.replace_data && p.data.is_some() => p.data.clone(),
        _ => req.data.clone(),
    };
    LockRecord {
        key: req.key.to_string(),
        owner: req.owner.to_string(),
        record_version: new_record_version(),
        lease_duration_ms: req.lease_duration_ms,
        data,
        released: false,
        created_at_ms: req.stamp_created.then(now_ms),
    }
}

fn remaining(deadline: Option<Instant>) -> Duration {
    match deadline {
        Some(d) => d.saturating_duration_since(Instant::now()),
        None => Duration::MAX,
    }
}

fn not_granted(req: &AcquireRequest<'_>, started: Instant) -> LockError {
    LockError::NotGranted {
        key: req.key.to_string(),
        waited: started.elapsed(),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
