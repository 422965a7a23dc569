use std::time::Duration;

use serde::Serialize;

use fenlock_core::{
    AcquireOptions, ClientOptions, LockClient, LockError, LockRecord, ReleasePolicy,
};

// ─── Exit Codes ─────────────────────────────────────────────────────────────

// BSD sysexits, so scripts can tell "busy" apart from "broken"
const EXIT_USAGE: i32 = 64;
const EXIT_IOERR: i32 = 74;
const EXIT_TEMPFAIL: i32 = 75;

// ─── Run ────────────────────────────────────────────────────────────────────

pub struct RunOpts {
    pub key: String,
    pub lease_ms: u64,
    pub heartbeat_ms: Option<u64>,
    pub wait_ms: Option<u64>,
    pub data: Option<String>,
    pub reentrant: bool,
    pub clock_bypass: bool,
    pub stamp_created: bool,
    pub keep_record: bool,
    pub command: Vec<String>,
}

pub async fn run(storage: &str, owner: Option<String>, opts: RunOpts) -> i32 {
    let mut options = ClientOptions::new()
        .with_lease_duration(Duration::from_millis(opts.lease_ms))
        .with_created_time(opts.stamp_created);
    if let Some(owner) = owner {
        options = options.with_owner(owner);
    }
    if let Some(heartbeat_ms) = opts.heartbeat_ms {
        options = options.with_heartbeat_period(Duration::from_millis(heartbeat_ms));
    }
    if opts.keep_record {
        options = options.with_release_policy(ReleasePolicy::MarkReleased);
    }

    let client = match create_client(storage, options) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("{e}");
            return EXIT_USAGE;
        }
    };

    let mut acquire = AcquireOptions::new()
        .with_reentrant(opts.reentrant)
        .with_local_clock_bypass(opts.clock_bypass);
    if let Some(wait_ms) = opts.wait_ms {
        acquire = acquire.with_timeout(Duration::from_millis(wait_ms));
    }
    if let Some(data) = opts.data {
        acquire = acquire.with_data(data.into_bytes()).with_replace_data(true);
    }

    let code = match client.acquire_with(&opts.key, acquire).await {
        Ok(handle) => {
            let version = handle.record_version().await;
            tracing::info!(
                key = %opts.key,
                owner = %handle.owner(),
                version = %version,
                "🔒 Lock acquired"
            );
            let status = run_command(&opts.command).await;
            match client.release(&handle).await {
                Ok(true) => tracing::info!(key = %opts.key, "🔓 Lock released"),
                Ok(false) => {
                    tracing::warn!(key = %opts.key, "⚠️  Lock was already gone at release time")
                }
                Err(e) => tracing::warn!(
                    key = %opts.key,
                    error = %e,
                    "⚠️  Release failed; the lease will lapse on its own"
                ),
            }
            status
        }
        Err(e @ LockError::NotGranted { .. }) => {
            tracing::error!(key = %opts.key, "⏳ {e}");
            EXIT_TEMPFAIL
        }
        Err(e) => {
            tracing::error!(key = %opts.key, error = %e, "Could not acquire lock");
            EXIT_IOERR
        }
    };

    client.shutdown().await;
    code
}

async fn run_command(argv: &[String]) -> i32 {
    let Some((program, args)) = argv.split_first() else {
        return EXIT_USAGE;
    };
    tracing::info!(command = %argv.join(" "), "▶ Running guarded command");
    match tokio::process::Command::new(program).args(args).status().await {
        Ok(status) => status.code().unwrap_or(1),
        Err(e) => {
            tracing::error!(error = %e, "Failed to launch command");
            127
        }
    }
}

// ─── Get ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct RecordView<'a> {
    key: &'a str,
    owner: &'a str,
    record_version: &'a str,
    lease_duration_ms: u64,
    released: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at_ms: Option<u64>,
}

impl<'a> From<&'a LockRecord> for RecordView<'a> {
    fn from(record: &'a LockRecord) -> Self {
        Self {
            key: &record.key,
            owner: &record.owner,
            record_version: &record.record_version,
            lease_duration_ms: record.lease_duration_ms,
            released: record.released,
            data: record
                .data
                .as_deref()
                .map(|data| String::from_utf8_lossy(data).into_owned()),
            created_at_ms: record.created_at_ms,
        }
    }
}

pub async fn get(storage: &str, owner: Option<String>, key: &str, json: bool) -> i32 {
    let mut options = ClientOptions::new();
    if let Some(owner) = owner {
        options = options.with_owner(owner);
    }
    let client = match create_client(storage, options) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("{e}");
            return EXIT_USAGE;
        }
    };

    let code = match client.get(key).await {
        Ok(Some(record)) => {
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&RecordView::from(&record)).unwrap()
                );
            } else {
                print_record(&record);
            }
            0
        }
        Ok(None) => {
            if json {
                println!("null");
            } else {
                println!("No lock record for '{key}'");
            }
            0
        }
        Err(e) => {
            tracing::error!(key = %key, error = %e, "Lookup failed");
            EXIT_IOERR
        }
    };

    client.shutdown().await;
    code
}

fn print_record(record: &LockRecord) {
    println!("key:             {}", record.key);
    println!("owner:           {}", record.owner);
    println!("record version:  {}", record.record_version);
    println!("lease ms:        {}", record.lease_duration_ms);
    println!("released:        {}", record.released);
    match &record.data {
        Some(data) => println!("data:            {}", String::from_utf8_lossy(data)),
        None => println!("data:            (none)"),
    }
    match record.created_at_ms {
        Some(created_at_ms) => println!("created at ms:   {}", created_at_ms),
        None => println!("created at ms:   (untracked)"),
    }
}

// ─── Watch ──────────────────────────────────────────────────────────────────

pub async fn watch(storage: &str, owner: Option<String>, key: &str, interval_ms: u64) -> i32 {
    let mut options = ClientOptions::new();
    if let Some(owner) = owner {
        options = options.with_owner(owner);
    }
    let client = match create_client(storage, options) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("{e}");
            return EXIT_USAGE;
        }
    };

    tracing::info!(key = %key, interval_ms, "👀 Watching for ownership changes (Ctrl-C to stop)");
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(100)));
    let mut last: Option<String> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match client.get(key).await {
                    Ok(record) => {
                        let line = describe(record.as_ref());
                        if last.as_deref() != Some(line.as_str()) {
                            println!("{line}");
                            last = Some(line);
                        }
                    }
                    Err(e) => tracing::warn!(key = %key, error = %e, "⚠️  Read failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                client.shutdown().await;
                return 0;
            }
        }
    }
}

fn describe(record: Option<&LockRecord>) -> String {
    match record {
        None => "(no record)".to_string(),
        Some(r) if r.released => format!(
            "released by {} [{}]",
            r.owner,
            short_version(&r.record_version)
        ),
        Some(r) => format!(
            "held by {} [{}], lease {}ms",
            r.owner,
            short_version(&r.record_version),
            r.lease_duration_ms
        ),
    }
}

fn short_version(version: &str) -> &str {
    version.get(..8).unwrap_or(version)
}

// ─── Storage Backend Selection ──────────────────────────────────────────────

fn create_client(storage: &str, options: ClientOptions) -> Result<LockClient, String> {
    if storage == "memory" {
        tracing::info!("💾 Storage backend: in-memory (locks are process-local)");
        LockClient::in_memory(options).map_err(|e| e.to_string())
    } else if let Some(path) = storage.strip_prefix("sqlite:") {
        #[cfg(feature = "sqlite")]
        {
            tracing::info!("💾 Storage backend: SQLite ({})", path);
            LockClient::with_sqlite(path, options).map_err(|e| e.to_string())
        }
        #[cfg(not(feature = "sqlite"))]
        {
            let _ = path;
            Err("SQLite storage requested but the `sqlite` feature is not enabled. \
                 Rebuild with: cargo build --features sqlite"
                .to_string())
        }
    } else {
        Err(format!(
            "Unknown storage backend: '{}'. Use 'memory' or 'sqlite:<path>'",
            storage
        ))
    }
}
