use futures::future::join_all;
use serde::Deserialize;
use tracing::{error, info, warn};

use super::{Agent, AgentRequest, MessageOutcome};
use crate::cache::{Partition, RequestKey};
use crate::error::{AgentError, Result};

/// Commands the hosting page can post to the agent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action")]
pub enum Command {
    #[serde(rename = "CACHE_VIDEOS")]
    CacheVideos { videos: Vec<VideoDescriptor> },
}

/// A video to pre-fetch: either `{url, filename}` or a bare URL.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum VideoDescriptor {
    Named { url: String, filename: String },
    Url(String),
}

impl VideoDescriptor {
    pub fn url(&self) -> &str {
        match self {
            VideoDescriptor::Named { url, .. } | VideoDescriptor::Url(url) => url.as_str(),
        }
    }

    /// Explicit filename, or the last path segment of the URL.
    pub fn filename(&self) -> Option<&str> {
        match self {
            VideoDescriptor::Named { filename, .. } => Some(filename.as_str()),
            VideoDescriptor::Url(url) => url
                .split(['?', '#'])
                .next()
                .and_then(|path| path.rsplit('/').next())
                .filter(|name| !name.is_empty()),
        }
    }
}

/// What happened to each descriptor of a `CACHE_VIDEOS` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    /// Keys written to the video partition.
    pub cached: Vec<String>,
    /// Source URLs that were skipped.
    pub skipped: Vec<String>,
}

impl Agent {
    pub(crate) async fn handle_message(&self, payload: serde_json::Value) -> MessageOutcome {
        match serde_json::from_value::<Command>(payload) {
            Ok(Command::CacheVideos { videos }) => {
                MessageOutcome::CachedVideos(self.cache_videos(videos).await)
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unrecognised message");
                MessageOutcome::Ignored(e.to_string())
            }
        }
    }

    /// Pre-fetches every video into the video partition under its stable
    /// `/cache/<filename>` key. Failures are per descriptor.
    pub async fn cache_videos(&self, videos: Vec<VideoDescriptor>) -> BulkReport {
        let mut report = BulkReport::default();
        info!(count = videos.len(), "Background video caching");

        let partition_name = self.config.video_partition();
        let partition = match self.storage.open(&partition_name).await {
            Ok(partition) => partition,
            Err(e) => {
                error!(partition = %partition_name, error = %e, "Cannot open video partition");
                report.skipped = videos.iter().map(|v| v.url().to_string()).collect();
                return report;
            }
        };

        let results = join_all(videos.iter().map(|video| self.cache_video(&partition, video))).await;
        for (video, result) in videos.iter().zip(results) {
            match result {
                Ok(key) => report.cached.push(key.to_string()),
                Err(e) => {
                    warn!(url = video.url(), error = %e, "Video caching failed, skipping");
                    report.skipped.push(video.url().to_string());
                }
            }
        }

        info!(
            cached = report.cached.len(),
            skipped = report.skipped.len(),
            "Background video caching finished"
        );
        report
    }

    async fn cache_video(&self, partition: &Partition, video: &VideoDescriptor) -> Result<RequestKey> {
        let source = self.config.resolve(video.url())?;
        let filename = video.filename().ok_or_else(|| {
            AgentError::InvalidMessage(format!("no filename for {}", video.url()))
        })?;
        let key = RequestKey::get(&self.config.video_cache_url(filename)?);

        let response = self.fetcher.fetch(&AgentRequest::get(source)).await?;
        if !response.status().is_success() {
            return Err(AgentError::UpstreamStatus {
                status: response.status(),
                url: video.url().to_string(),
            });
        }

        partition.put(key.clone(), response).await?;
        Ok(key)
    }
}
