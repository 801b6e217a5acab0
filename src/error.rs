use http::StatusCode;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("network unavailable for {url}: {reason}")]
    NetworkUnavailable { url: String, reason: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("upstream returned status {status} for {url}")]
    UpstreamStatus { status: StatusCode, url: String },

    #[error("no cached entry for {0}")]
    NotFoundInCache(String),

    #[error("malformed range header: {0:?}")]
    MalformedRange(String),

    #[error("install manifest entry {url} failed: {source}")]
    PartialManifestFailure {
        url: String,
        #[source]
        source: Box<AgentError>,
    },

    #[error("invalid URL {0:?}")]
    InvalidUrl(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    #[error("event task failed: {0}")]
    Task(String),
}

impl AgentError {
    pub fn network(url: impl Into<String>, reason: impl ToString) -> Self {
        AgentError::NetworkUnavailable {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}
