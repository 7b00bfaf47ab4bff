//! Duet server binary.
//!
//! # Usage
//!
//! ```bash
//! # Local development, any origin
//! duet-server --bind 127.0.0.1:8080
//!
//! # Production behind a known front-end
//! duet-server --bind 0.0.0.0:8080 \
//!     --allowed-origin https://duet.example \
//!     --presence-formula connected
//! ```
//!
//! Every flag can also be set through the environment (`DUET_BIND`,
//! `DUET_ALLOWED_ORIGINS`, ...). `RUST_LOG` overrides `--log-level`.

use std::time::Duration;

use clap::Parser;
use duet::{DuetServerBuilder, ServerConfig};
use duet_presence::{PresenceConfig, PresenceFormula};
use duet_transport::TransportConfig;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Duet matchmaking server
#[derive(Parser, Debug)]
#[command(name = "duet-server")]
#[command(about = "Pairs anonymous clients into one-to-one chat rooms")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, env = "DUET_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Seconds of client silence before a connection is dropped
    #[arg(
        long,
        env = "DUET_IDLE_TIMEOUT_SECS",
        default_value = "30",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    idle_timeout_secs: u64,

    /// Seconds a new socket has to finish the WebSocket upgrade
    #[arg(
        long,
        env = "DUET_HANDSHAKE_TIMEOUT_SECS",
        default_value = "10",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    handshake_timeout_secs: u64,

    /// Seconds between participant-count broadcasts
    #[arg(long, env = "DUET_PRESENCE_INTERVAL_SECS", default_value = "10")]
    presence_interval_secs: u64,

    /// What the participant count counts (engaged, waiting, connected)
    #[arg(long, env = "DUET_PRESENCE_FORMULA", default_value = "engaged")]
    presence_formula: PresenceFormula,

    /// Browser origin allowed to connect; repeat for several. None = any
    #[arg(long = "allowed-origin", env = "DUET_ALLOWED_ORIGINS", value_delimiter = ',')]
    allowed_origins: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DUET_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            bind_addr: self.bind,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            transport: TransportConfig {
                allowed_origins: self.allowed_origins,
                handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            },
            presence: PresenceConfig {
                interval: Duration::from_secs(self.presence_interval_secs),
                formula: self.presence_formula,
                ..PresenceConfig::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Duet server starting");
    if args.allowed_origins.is_empty() {
        tracing::warn!("No --allowed-origin given, accepting connections from any origin");
    }

    let server = DuetServerBuilder::with_config(args.into_config()).build().await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
