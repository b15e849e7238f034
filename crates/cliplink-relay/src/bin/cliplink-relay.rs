// Rendezvous relay for Cliplink peers

use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cliplink_relay::{RelayConfig, RelayServer};

#[derive(Parser)]
#[command(name = "cliplink-relay")]
#[command(about = "Cliplink rendezvous relay", long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, env = "CLIPLINK_BIND", default_value = "0.0.0.0:3000")]
    bind: SocketAddr,

    /// Largest accepted WebSocket message in bytes
    #[arg(long, env = "CLIPLINK_MAX_MESSAGE_SIZE", default_value_t = 1024 * 1024)]
    max_message_size: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = RelayConfig {
        bind_addr: cli.bind,
        max_message_size: cli.max_message_size,
    };

    let server = RelayServer::bind(config).await?;
    server.serve().await?;
    Ok(())
}
