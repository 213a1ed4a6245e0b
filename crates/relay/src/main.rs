use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use fenced_harness_relay::server::{self, RelayServerConfig};

#[derive(Parser, Debug)]
#[command(name = "fenced-relay")]
#[command(about = "Token/value signal relay for fenced-frame tests")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "FENCED_RELAY_ADDR", default_value = "127.0.0.1:8090")]
    addr: SocketAddr,

    /// Seconds an unread value is kept
    #[arg(long, env = "FENCED_RELAY_TTL_SECS", default_value = "300")]
    ttl_secs: u64,

    /// Seconds between sweeps of expired values
    #[arg(long, default_value = "30")]
    sweep_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.sweep_secs == 0 {
        anyhow::bail!("--sweep-secs must be greater than zero");
    }

    let config = RelayServerConfig {
        value_ttl: Duration::from_secs(args.ttl_secs),
        sweep_interval: Duration::from_secs(args.sweep_secs),
    };

    info!(
        "Starting fenced-relay on http://{} (ttl: {}s)",
        args.addr, args.ttl_secs
    );

    server::serve(args.addr, config).await
}
