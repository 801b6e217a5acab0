use std::process::exit;

use clap::Parser;
use offline_agent::proxy::ProxyServer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::CliArgs;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    // RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            exit(1);
        }
    };
    info!(
        version = %config.agent.version,
        cache_dir = ?config.server.cache_dir,
        timeout_secs = config.server.request_timeout_secs,
        "Starting offline agent"
    );

    let server = match ProxyServer::new(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to open cache storage: {}", e);
            exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Agent stopped: {}", e);
        exit(1);
    }
}
