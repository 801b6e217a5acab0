use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use offline_agent::config::Config;
use offline_agent::error::Result;
use url::Url;

#[derive(Parser)]
#[command(
    version,
    about = "Offline caching proxy for a web app and its training videos",
    long_about = "Intercepts every request for a web app and answers it from versioned local \
                  cache partitions: cache-first for static assets, network-first for page loads, \
                  and byte-range slicing for cached videos so players can seek offline.\n\
                  \n\
                  Post {\"action\": \"CACHE_VIDEOS\", \"videos\": [...]} to the control path to \
                  pre-fetch videos in the background."
)]
pub struct CliArgs {
    /// JSON configuration file; command-line flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address the proxy listens on
    #[arg(short, long, help = "Listen address (default 127.0.0.1:3000)")]
    pub listen: Option<SocketAddr>,

    /// The app's own origin; other origins are passed through uncached
    #[arg(short, long)]
    pub origin: Option<Url>,

    /// Cache generation tag; changing it drops old partitions on activation
    #[arg(long = "version-tag")]
    pub version_tag: Option<String>,

    /// Directory for durable cache partitions
    #[arg(long, conflicts_with = "memory_only")]
    pub cache_dir: Option<PathBuf>,

    /// Keep every partition in memory only
    #[arg(long)]
    pub memory_only: bool,

    /// Maximum concurrent requests
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Per-attempt upstream timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Upstream retries after a network failure
    #[arg(long)]
    pub retries: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,
}

impl CliArgs {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(listen) = self.listen {
            config.server.listen = listen;
        }
        if let Some(origin) = &self.origin {
            config.agent.origin = origin.clone();
        }
        if let Some(version) = &self.version_tag {
            config.agent.version = version.clone();
        }
        if let Some(dir) = &self.cache_dir {
            config.server.cache_dir = Some(dir.clone());
        }
        if self.memory_only {
            config.server.cache_dir = None;
        }
        if let Some(max) = self.max_connections {
            config.server.max_connections = max;
        }
        if let Some(timeout) = self.timeout {
            config.server.request_timeout_secs = timeout;
        }
        if let Some(retries) = self.retries {
            config.server.max_retries = retries;
        }

        Ok(config)
    }
}
