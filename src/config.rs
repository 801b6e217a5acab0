use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::MAX_MEMORY_ENTRY_SIZE;
use crate::error::{AgentError, Result};

const DEFAULT_ORIGIN: &str = "http://127.0.0.1:8000/";

/// What the agent caches and how it names its partitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// The app's own origin; anything else is cross-origin and bypassed.
    pub origin: Url,
    pub cache_prefix: String,
    /// Cache generation. Changing it drops every partition on activation.
    pub version: String,
    /// Fetched and stored all-or-nothing on install.
    pub install_manifest: Vec<String>,
    /// Served when a navigation fails and the page itself is not cached.
    pub offline_document: String,
    /// A URL path containing any of these goes to the video handler.
    pub video_markers: Vec<String>,
    /// Stable local path prefix bulk-cached videos are stored under.
    pub video_cache_path: String,
    pub default_video_content_type: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse(DEFAULT_ORIGIN).expect("default origin is a valid URL"),
            cache_prefix: "magic-training".to_string(),
            version: "v1".to_string(),
            install_manifest: vec![
                "/MagicTraining/".to_string(),
                "/MagicTraining/index.html".to_string(),
                "/MagicTraining/manifest.json".to_string(),
                "/MagicTraining/icons/icon-152.png".to_string(),
                "/MagicTraining/icons/icon-192.png".to_string(),
                "/MagicTraining/icons/icon-512.png".to_string(),
            ],
            offline_document: "/MagicTraining/".to_string(),
            video_markers: vec![
                "/video/".to_string(),
                "/cache/".to_string(),
                ".mp4".to_string(),
            ],
            video_cache_path: "/cache/".to_string(),
            default_video_content_type: "video/mp4".to_string(),
        }
    }
}

impl AgentConfig {
    pub fn asset_partition(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.version)
    }

    pub fn video_partition(&self) -> String {
        format!("{}-videos-{}", self.cache_prefix, self.version)
    }

    /// Resolves a manifest entry or descriptor URL against the origin.
    pub fn resolve(&self, reference: &str) -> Result<Url> {
        self.origin
            .join(reference)
            .map_err(|_| AgentError::InvalidUrl(reference.to_string()))
    }

    /// Stable local URL a bulk-cached video is keyed under.
    ///
    /// The filename becomes exactly one percent-encoded segment under
    /// `video_cache_path`, so it can never address anything outside it.
    pub fn video_cache_url(&self, filename: &str) -> Result<Url> {
        let unusable =
            || AgentError::InvalidMessage(format!("unusable video filename {filename:?}"));
        if filename.is_empty()
            || filename == "."
            || filename == ".."
            || filename.contains(['/', '\\'])
        {
            return Err(unusable());
        }

        let mut url = self.resolve(&self.video_cache_path)?;
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| unusable())?
            .pop_if_empty()
            .push(filename);
        Ok(url)
    }

    pub fn is_video_path(&self, url: &Url) -> bool {
        let path = url.path();
        self.video_markers.iter().any(|m| path.contains(m.as_str()))
    }
}

/// How the proxy host listens and reaches the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub max_connections: usize,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    /// Root directory for durable partitions; memory-only when unset.
    pub cache_dir: Option<PathBuf>,
    pub max_memory_entry_size: usize,
    /// POST target that delivers a JSON message to the agent.
    pub control_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_connections: 100,
            request_timeout_secs: 10,
            max_retries: 0,
            cache_dir: Some(PathBuf::from("agent_cache")),
            max_memory_entry_size: MAX_MEMORY_ENTRY_SIZE,
            control_path: "/__agent/message".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub server: ServerConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_names_follow_version() {
        let mut config = AgentConfig::default();
        assert_eq!(config.asset_partition(), "magic-training-v1");
        assert_eq!(config.video_partition(), "magic-training-videos-v1");

        config.version = "v2".to_string();
        assert_eq!(config.asset_partition(), "magic-training-v2");
        assert_eq!(config.video_partition(), "magic-training-videos-v2");
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let config = AgentConfig::default();
        assert_eq!(
            config.resolve("/MagicTraining/index.html").unwrap().as_str(),
            "http://127.0.0.1:8000/MagicTraining/index.html"
        );
        assert_eq!(
            config.resolve("https://cdn.example/lib.css").unwrap().as_str(),
            "https://cdn.example/lib.css"
        );
    }

    #[test]
    fn test_video_cache_url() {
        let config = AgentConfig::default();
        assert_eq!(
            config.video_cache_url("squats.mp4").unwrap().as_str(),
            "http://127.0.0.1:8000/cache/squats.mp4"
        );
        assert!(config.video_cache_url("").is_err());
        assert!(config.video_cache_url("../etc/passwd").is_err());
        assert!(config.video_cache_url("..\\MagicTraining\\index.html").is_err());
        assert!(config.video_cache_url("..").is_err());

        let odd = config.video_cache_url("a b?x=1#frag%2e.mp4").unwrap();
        assert_eq!(odd.path(), "/cache/a%20b%3Fx=1%23frag%252e.mp4");
        assert_eq!(odd.query(), None);
        assert_eq!(odd.fragment(), None);

        let nested = AgentConfig {
            video_cache_path: "/media/offline".into(),
            ..AgentConfig::default()
        };
        assert_eq!(
            nested.video_cache_url("lunges.mp4").unwrap().as_str(),
            "http://127.0.0.1:8000/media/offline/lunges.mp4"
        );
    }

    #[test]
    fn test_video_path_markers() {
        let config = AgentConfig::default();
        let url = |p: &str| config.resolve(p).unwrap();
        assert!(config.is_video_path(&url("/MagicTraining/video/1")));
        assert!(config.is_video_path(&url("/cache/lunges.mp4")));
        assert!(config.is_video_path(&url("/media/plank.mp4")));
        assert!(!config.is_video_path(&url("/MagicTraining/index.html")));
    }

    #[test]
    fn test_partial_json_config_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"agent": {"version": "v7"}, "server": {"max_retries": 2}}"#)
                .unwrap();
        assert_eq!(config.agent.asset_partition(), "magic-training-v7");
        assert_eq!(config.agent.install_manifest.len(), 6);
        assert_eq!(config.server.max_retries, 2);
        assert_eq!(config.server.max_connections, 100);
    }
}
