use http::{Method, StatusCode};
use tracing::{debug, info, warn};

use super::{Agent, AgentRequest, AgentResponse, ResponseKind};
use crate::config::AgentConfig;

const OFFLINE_PAGE: &str = "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Offline</title></head>\n<body><h1>You are offline</h1><p>This page is not available offline. Check your connection and try again.</p></body>\n</html>\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    /// Straight to the network, nothing read from or written to a partition.
    Bypass(&'static str),
    Video,
    NetworkFirst,
    CacheFirst,
}

pub(crate) fn classify(config: &AgentConfig, request: &AgentRequest, controlling: bool) -> Route {
    if !controlling {
        return Route::Bypass("not controlling clients");
    }
    if !request.is_same_origin(&config.origin) {
        return Route::Bypass("cross-origin");
    }
    if request.method != Method::GET {
        return Route::Bypass("non-GET");
    }
    if config.is_video_path(&request.url) {
        return Route::Video;
    }
    if request.is_navigation() {
        return Route::NetworkFirst;
    }
    Route::CacheFirst
}

impl Agent {
    /// Resolves a fetch. Always produces a response, real or synthetic.
    pub(crate) async fn respond(&self, request: AgentRequest) -> AgentResponse {
        let route = classify(&self.config, &request, self.is_controlling().await);
        debug!(method = %request.method, url = %request.url, route = ?route, "Routing request");

        match route {
            Route::Bypass(reason) => self.pass_through(request, reason).await,
            Route::Video => self.serve_video(request).await,
            Route::NetworkFirst => self.network_first(request).await,
            Route::CacheFirst => self.cache_first(request).await,
        }
    }

    async fn pass_through(&self, request: AgentRequest, reason: &'static str) -> AgentResponse {
        match self.fetcher.fetch(&request).await {
            Ok(response) => response.with_kind(request.response_kind(&self.config.origin)),
            Err(e) => {
                warn!(url = %request.url, reason, error = %e, "Pass-through fetch failed");
                AgentResponse::synthetic(
                    StatusCode::BAD_GATEWAY,
                    "text/plain; charset=utf-8",
                    "Upstream unavailable",
                )
            }
        }
    }

    async fn network_first(&self, request: AgentRequest) -> AgentResponse {
        let key = request.key();
        match self.fetcher.fetch(&request).await {
            Ok(response) => {
                let response = response.with_kind(ResponseKind::Basic);
                if !response.status().is_success() {
                    return response;
                }
                let (returned, stored) = response.tee();
                self.store(&self.config.asset_partition(), key, stored).await;
                returned
            }
            Err(e) => {
                info!(url = %request.url, error = %e, "Navigation offline, falling back to cache");
                if let Some(cached) = self.lookup_any(&key).await {
                    return cached;
                }
                if let Some(shell) = self.offline_document().await {
                    return shell;
                }
                warn!(url = %request.url, "No cached page or offline document");
                AgentResponse::synthetic(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "text/html; charset=utf-8",
                    OFFLINE_PAGE,
                )
            }
        }
    }

    async fn offline_document(&self) -> Option<AgentResponse> {
        match self.config.resolve(&self.config.offline_document) {
            Ok(url) => self.lookup_any(&AgentRequest::get(url).key()).await,
            Err(e) => {
                warn!(error = %e, "Offline document is not a valid URL");
                None
            }
        }
    }

    async fn cache_first(&self, request: AgentRequest) -> AgentResponse {
        let key = request.key();
        if let Some(cached) = self.lookup_any(&key).await {
            debug!(key = %key, "Served from cache");
            return cached;
        }

        let kind = request.response_kind(&self.config.origin);
        match self.fetcher.fetch(&request).await {
            Ok(response) => {
                let response = response.with_kind(kind);
                if response.status() != StatusCode::OK || kind != ResponseKind::Basic {
                    return response;
                }
                let (returned, stored) = response.tee();
                self.store(&self.config.asset_partition(), key, stored).await;
                returned
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Fetch failed with nothing cached");
                AgentResponse::synthetic(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "text/plain; charset=utf-8",
                    "Offline and not cached",
                )
            }
        }
    }
}
