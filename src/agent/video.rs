use bytes::Bytes;
use http::header::{HeaderValue, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{Agent, AgentRequest, AgentResponse, ByteRange, ResponseKind};

impl Agent {
    /// Cache-then-serve for video, honouring single byte ranges.
    pub(crate) async fn serve_video(&self, request: AgentRequest) -> AgentResponse {
        let full = match self.video_entry(&request).await {
            Ok(full) => full,
            Err(response) => return response,
        };

        let Some(raw) = request.range_header() else {
            return with_accept_ranges(full);
        };
        match raw.parse::<ByteRange>() {
            Ok(range) => partial_response(full, range, &self.config.default_video_content_type),
            Err(e) => {
                debug!(url = %request.url, error = %e, "Unusable range, serving full body");
                with_accept_ranges(full)
            }
        }
    }

    /// The full stored video, fetched and stored on a miss.
    ///
    /// `Err` carries the response to hand back as-is: the synthetic 404 when
    /// the network is down, or a non-200 upstream answer.
    async fn video_entry(&self, request: &AgentRequest) -> Result<AgentResponse, AgentResponse> {
        let key = request.key();
        let partition_name = self.config.video_partition();
        let partition = match self.storage.open(&partition_name).await {
            Ok(partition) => Some(partition),
            Err(e) => {
                warn!(partition = %partition_name, error = %e, "Video partition unavailable");
                None
            }
        };

        if let Some(partition) = &partition {
            match partition.get(&key).await {
                Ok(Some(cached)) => {
                    debug!(key = %key, "Video served from cache");
                    return Ok(cached);
                }
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Video lookup failed"),
            }
        }

        info!(url = %request.url, "Video not cached, fetching");
        let response = match self.fetcher.fetch(&request.without_range()).await {
            Ok(response) => response.with_kind(ResponseKind::Basic),
            Err(e) => {
                warn!(url = %request.url, error = %e, "Video unavailable");
                return Err(video_unavailable());
            }
        };
        if response.status() != StatusCode::OK {
            return Err(response);
        }

        let (returned, stored) = response.tee();
        match partition {
            Some(partition) => match partition.put(key.clone(), stored).await {
                Ok(()) => info!(key = %key, size = returned.body().len(), "Video cached"),
                Err(e) => warn!(key = %key, error = %e, "Failed to cache video"),
            },
            None => drop(stored),
        }
        Ok(returned)
    }
}

fn video_unavailable() -> AgentResponse {
    AgentResponse::json(
        StatusCode::NOT_FOUND,
        &json!({
            "error": "Video unavailable",
            "message": "Check your internet connection",
        }),
    )
}

fn with_accept_ranges(mut response: AgentResponse) -> AgentResponse {
    response
        .headers_mut()
        .insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response
}

/// Builds the 206 (or 416) answer for `range` out of the full stored body.
pub(crate) fn partial_response(
    full: AgentResponse,
    range: ByteRange,
    default_content_type: &str,
) -> AgentResponse {
    let kind = full.kind();
    let content_type = full
        .content_type()
        .cloned()
        .or_else(|| HeaderValue::from_str(default_content_type).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    let body = full.body();
    let total = body.len();

    // a range that clamps to nothing is unsatisfiable: empty body, `bytes */N`
    let (status, chunk, content_range) = match range.resolve(total) {
        Some((start, end)) => (
            StatusCode::PARTIAL_CONTENT,
            body.slice(start..=end),
            format!("bytes {start}-{end}/{total}"),
        ),
        None => (
            StatusCode::RANGE_NOT_SATISFIABLE,
            Bytes::new(),
            format!("bytes */{total}"),
        ),
    };

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(chunk.len()));
    if let Ok(value) = HeaderValue::from_str(&content_range) {
        headers.insert(CONTENT_RANGE, value);
    }

    AgentResponse::new(status, headers, chunk).with_kind(kind)
}
