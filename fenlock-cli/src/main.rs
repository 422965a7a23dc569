mod handlers;

use clap::{Parser, Subcommand};

use crate::handlers::RunOpts;

#[derive(Parser)]
#[command(
    name = "fenlock",
    about = "Fenlock — Lease-based locks over conditional-write stores",
    version
)]
struct Cli {
    /// Storage backend: "memory" or "sqlite:<path>"
    #[arg(long, global = true, default_value = "memory", env = "FENLOCK_STORAGE")]
    storage: String,

    /// Owner identity written into lock records (defaults to host#random)
    #[arg(long, global = true, env = "FENLOCK_OWNER")]
    owner: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hold a lock while running a command, then release it
    Run {
        /// Lock key to acquire
        key: String,

        /// Lease duration in milliseconds
        #[arg(long, default_value = "20000")]
        lease_ms: u64,

        /// Heartbeat period in milliseconds (defaults to a quarter of the lease)
        #[arg(long)]
        heartbeat_ms: Option<u64>,

        /// How long to wait for a busy lock (defaults to twice the lease); 0 tries once
        #[arg(long)]
        wait_ms: Option<u64>,

        /// Payload stored in the lock record for observers
        #[arg(long)]
        data: Option<String>,

        /// Skip the lease wait when the current holder has this same owner identity
        #[arg(long)]
        reentrant: bool,

        /// Trust the local clock to treat stale records as expired (unsafe across skewed hosts)
        #[arg(long)]
        clock_bypass: bool,

        /// Stamp acquisitions with wall-clock creation time
        #[arg(long)]
        stamp_created: bool,

        /// Leave a released tombstone behind instead of deleting the record
        #[arg(long)]
        keep_record: bool,

        /// Command to run while the lock is held
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Print the current lock record for a key
    Get {
        /// Lock key to look up
        key: String,

        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Poll a key and print ownership transitions
    Watch {
        /// Lock key to watch
        key: String,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Run {
            key,
            lease_ms,
            heartbeat_ms,
            wait_ms,
            data,
            reentrant,
            clock_bypass,
            stamp_created,
            keep_record,
            command,
        } => {
            handlers::run(
                &cli.storage,
                cli.owner,
                RunOpts {
                    key,
                    lease_ms,
                    heartbeat_ms,
                    wait_ms,
                    data,
                    reentrant,
                    clock_bypass,
                    stamp_created,
                    keep_record,
                    command,
                },
            )
            .await
        }
        Commands::Get { key, json } => handlers::get(&cli.storage, cli.owner, &key, json).await,
        Commands::Watch { key, interval_ms } => {
            handlers::watch(&cli.storage, cli.owner, &key, interval_ms).await
        }
        Commands::Version => {
            println!("fenlock {}", env!("CARGO_PKG_VERSION"));
            println!("Lease-based lock client for conditional-write stores");
            0
        }
    };

    std::process::exit(code);
}
