//! Threadline CLI entry point.
//!
//! # Usage
//!
//! ```bash
//! # Against a real server
//! threadline connect --url https://chat.example.com --token $TOKEN \
//!     --viewer 7 --name Grace --pusher-key abc123 --pusher-cluster eu
//!
//! # Against the in-process simulated server
//! threadline simulate --users 6 --history 40 --chatter-secs 5
//! ```

use std::{path::Path, time::Duration};

use clap::{Parser, Subcommand};
use threadline_app::Runtime;
use threadline_cli::{CliError, LocalDriver, NetworkDriver, SystemEnv};
use threadline_client::{RealtimeCredentials, SessionContext, transport::HttpTransport};
use threadline_core::SyncConfig;
use threadline_harness::{
    InvariantRegistry, SimDriver, SimEnv, create_shared_backend, lock_backend,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Threadline messenger client
#[derive(Parser, Debug)]
#[command(name = "threadline")]
#[command(about = "Line-mode client for the Threadline messenger")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to a messenger server
    Connect {
        /// Server base URL
        #[arg(short, long)]
        url: String,

        /// Bearer token for the API
        #[arg(short, long, env = "THREADLINE_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Session file (JSON) with viewer, realtime and tunables
        #[arg(short, long)]
        session: Option<String>,

        /// Signed-in user id
        #[arg(long, required_unless_present = "session")]
        viewer: Option<u64>,

        /// Signed-in user name
        #[arg(long, default_value = "me")]
        name: String,

        /// Pusher application key (enables realtime)
        #[arg(long, env = "THREADLINE_PUSHER_KEY", requires = "pusher_cluster")]
        pusher_key: Option<String>,

        /// Pusher cluster
        #[arg(long, env = "THREADLINE_PUSHER_CLUSTER")]
        pusher_cluster: Option<String>,

        /// Tunables file (JSON)
        #[arg(long)]
        config: Option<String>,

        /// Messages per history page (overrides the tunables file)
        #[arg(long)]
        page_size: Option<u32>,
    },

    /// Run against an in-process simulated server
    Simulate {
        /// Number of users, the viewer included
        #[arg(long, default_value = "5")]
        users: u64,

        /// Seed for the simulated clock and randomness
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Messages of history seeded with the first peer
        #[arg(long, default_value = "30")]
        history: usize,

        /// Seconds between messages from simulated peers (0 disables)
        #[arg(long, default_value = "0")]
        chatter_secs: u64,

        /// Messages per history page
        #[arg(long, default_value = "20")]
        page_size: u32,

        /// Check state invariants after every render
        #[arg(long)]
        check_invariants: bool,
    },
}

const VIEWER: u64 = 1;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // stdout belongs to the console
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match args.command {
        Command::Connect {
            url,
            token,
            session,
            viewer,
            name,
            pusher_key,
            pusher_cluster,
            config,
            page_size,
        } => {
            let mut context = match (session, viewer) {
                (Some(path), _) => read_json::<SessionContext>(&path)?,
                (None, Some(viewer)) => SessionContext::new(viewer, name),
                (None, None) => {
                    return Err(CliError::Session {
                        path: String::new(),
                        reason: "either --session or --viewer is required".into(),
                    }
                    .into());
                },
            };
            if let (Some(key), Some(cluster)) = (pusher_key, pusher_cluster) {
                context = context.with_realtime(RealtimeCredentials { key, cluster });
            }
            if let Some(path) = config {
                context = context.with_config(read_json::<SyncConfig>(&path)?);
            }
            if let Some(page_size) = page_size {
                context.config.page_size = page_size;
            }

            tracing::info!(url = %url, viewer = context.viewer.id, "connecting");
            let http = HttpTransport::new(url, token).map_err(CliError::from)?;
            let driver = NetworkDriver::new(http, context.realtime.clone());
            Runtime::new(driver, SystemEnv::new(), context).run().await?;
        },

        Command::Simulate { users, seed, history, chatter_secs, page_size, check_invariants } => {
            let users = users.max(2);
            let env = SimEnv::with_seed(seed);
            let backend = create_shared_backend(env.clone());
            {
                let mut backend = lock_backend(&backend);
                backend.add_users(users);
                backend.seed_history(VIEWER, VIEWER + 1, history);
                for peer in (VIEWER + 1..=users).step_by(2) {
                    backend.set_online(peer, true);
                }
            }

            let context = SessionContext::new(VIEWER, "user-1")
                .with_realtime(RealtimeCredentials { key: "local".into(), cluster: "sim".into() })
                .with_config(SyncConfig { page_size, ..SyncConfig::default() });
            let mut sim = SimDriver::new(VIEWER, env.clone(), backend);
            if check_invariants {
                sim = sim.with_invariants(InvariantRegistry::standard(), context.config.pin_limit);
            }

            tracing::info!(users, seed, "starting simulated session");
            let chatter = (chatter_secs > 0).then(|| Duration::from_secs(chatter_secs));
            let peers = (VIEWER + 1..=users).collect();
            let driver = LocalDriver::new(sim, env.clone(), peers, chatter);
            Runtime::new(driver, env, context).run().await?;
        },
    }

    Ok(())
}

/// Read a JSON file into `T`.
fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, CliError> {
    let text = std::fs::read_to_string(Path::new(path))?;
    serde_json::from_str(&text)
        .map_err(|error| CliError::Session { path: path.to_owned(), reason: error.to_string() })
}
