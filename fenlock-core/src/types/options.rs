use std::time::Duration;

use crate::error::{LockError, Result};
use crate::infrastructure::ReleasePolicy;

const DEFAULT_LEASE: Duration = Duration::from_secs(20);
const DEFAULT_MAX_HEARTBEAT_FAILURES: u32 = 3;

/// Client-wide configuration. Build with `with_*` methods; unset values are
/// derived from the lease duration. Validated by `LockClient::new`.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Identity written as the record owner. One logical actor per value:
    /// two live callers sharing an owner string can bypass each other.
    pub owner: String,
    /// Lease duration requested by default on every acquisition
    pub lease_duration: Duration,
    /// Interval between heartbeat ticks; unset means a quarter of the lease
    pub heartbeat_period: Option<Duration>,
    /// Upper bound on a single heartbeat store call; unset means half the
    /// period, capped at one second
    pub heartbeat_call_timeout: Option<Duration>,
    /// Consecutive failed heartbeat attempts tolerated before the handle is
    /// conservatively marked lost
    pub max_heartbeat_failures: u32,
    /// Write an acquisition timestamp into records, enabling the
    /// local-clock bypass for other acquirers
    pub track_created_time: bool,
    /// Default overall acquisition timeout; unset means twice the lease
    pub acquire_timeout: Option<Duration>,
    /// Whether release deletes the record or leaves a released tombstone
    pub release_policy: ReleasePolicy,
    /// Release all held locks during `shutdown`
    pub release_on_shutdown: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            lease_duration: DEFAULT_LEASE,
            heartbeat_period: None,
            heartbeat_call_timeout: None,
            max_heartbeat_failures: DEFAULT_MAX_HEARTBEAT_FAILURES,
            track_created_time: false,
            acquire_timeout: None,
            release_policy: ReleasePolicy::Delete,
            release_on_shutdown: true,
        }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn with_lease_duration(mut self, lease: Duration) -> Self {
        self.lease_duration = lease;
        self
    }

    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = Some(period);
        self
    }

    pub fn with_heartbeat_call_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_call_timeout = Some(timeout);
        self
    }

    pub fn with_max_heartbeat_failures(mut self, max: u32) -> Self {
        self.max_heartbeat_failures = max;
        self
    }

    pub fn with_created_time(mut self, enabled: bool) -> Self {
        self.track_created_time = enabled;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    pub fn with_release_policy(mut self, policy: ReleasePolicy) -> Self {
        self.release_policy = policy;
        self
    }

    pub fn with_release_on_shutdown(mut self, enabled: bool) -> Self {
        self.release_on_shutdown = enabled;
        self
    }

    /// Effective heartbeat period (lease / 4 unless set).
    pub fn heartbeat_period(&self) -> Duration {
        self.heartbeat_period.unwrap_or(self.lease_duration / 4)
    }

    /// Effective per-call heartbeat timeout (period / 2 capped at 1s
    /// unless set).
    pub fn heartbeat_call_timeout(&self) -> Duration {
        self.heartbeat_call_timeout
            .unwrap_or_else(|| (self.heartbeat_period() / 2).min(Duration::from_secs(1)))
    }

    /// Effective default acquisition timeout (2 x lease unless set).
    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout.unwrap_or(self.lease_duration * 2)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.owner.is_empty() {
            return Err(LockError::Config("owner identity must not be empty".into()));
        }
        if self.lease_duration < Duration::from_millis(1) {
            return Err(LockError::Config(
                "lease duration must be at least one millisecond".into(),
            ));
        }
        let period = self.heartbeat_period();
        if period.is_zero() {
            return Err(LockError::Config("heartbeat period must be greater than zero".into()));
        }
        if period >= self.lease_duration {
            return Err(LockError::Config(format!(
                "heartbeat period {:?} must be shorter than the lease duration {:?}",
                period, self.lease_duration
            )));
        }
        let call_timeout = self.heartbeat_call_timeout();
        if call_timeout.is_zero() || call_timeout >= period {
            return Err(LockError::Config(format!(
                "heartbeat call timeout {:?} must be nonzero and shorter than the period {:?}",
                call_timeout, period
            )));
        }
        if self.max_heartbeat_failures == 0 {
            return Err(LockError::Config("max heartbeat failures must be at least 1".into()));
        }
        Ok(())
    }
}

/// Per-acquisition overrides and protocol switches.
#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    /// Lease duration for this lock; unset uses the client default
    pub lease_duration: Option<Duration>,
    /// Payload to attach to the record
    pub data: Option<Vec<u8>>,
    /// Overwrite the prior holder's payload on takeover. When false, an
    /// existing payload survives the takeover and `data` only applies to
    /// records that carried none.
    pub replace_data: bool,
    /// Treat a record held by this client's own owner identity as
    /// immediately expired, skipping the lease wait
    pub reentrant: bool,
    /// Treat a record as expired when its creation timestamp plus lease is
    /// past the local wall clock, skipping the lease wait. Relies on
    /// comparable clocks across machines; a skewed clock can steal a lock
    /// from a live holder.
    pub local_clock_bypass: bool,
    /// Overall acquisition timeout; unset uses the client default. Zero
    /// means a single immediate attempt.
    pub timeout: Option<Duration>,
}

impl AcquireOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lease_duration(mut self, lease: Duration) -> Self {
        self.lease_duration = Some(lease);
        self
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_replace_data(mut self, enabled: bool) -> Self {
        self.replace_data = enabled;
        self
    }

    pub fn with_reentrant(mut self, enabled: bool) -> Self {
        self.reentrant = enabled;
        self
    }

    pub fn with_local_clock_bypass(mut self, enabled: bool) -> Self {
        self.local_clock_bypass = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(lease) = self.lease_duration {
            if lease < Duration::from_millis(1) {
                return Err(LockError::Config(
                    "lease duration must be at least one millisecond".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Default owner identity: hostname plus a random suffix, so processes on
/// the same machine stay distinct.
fn default_owner() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string());
    format!("{}#{}", host, nanoid::nanoid!(8))
}
