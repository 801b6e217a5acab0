//! Shared helpers for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use url::Url;

use crate::agent::{Agent, AgentRequest, AgentResponse, Event, Fetcher};
use crate::cache::CacheStorage;
use crate::config::AgentConfig;
use crate::error::{AgentError, Result};

#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> AgentConfig {
    AgentConfig {
        origin: Url::parse("http://app.local/").unwrap(),
        cache_prefix: "fitness".to_string(),
        version: "v1".to_string(),
        install_manifest: vec!["/app/".to_string(), "/app/index.html".to_string()],
        offline_document: "/app/".to_string(),
        ..AgentConfig::default()
    }
}

/// Deterministic, position-dependent bytes so slices are checkable.
pub fn video_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn agent_with(config: AgentConfig, fetcher: Arc<MockFetcher>) -> Arc<Agent> {
    Arc::new(Agent::new(config, Arc::new(CacheStorage::in_memory()), fetcher))
}

pub async fn activated_agent(config: AgentConfig, fetcher: Arc<MockFetcher>) -> Arc<Agent> {
    let agent = agent_with(config, fetcher);
    agent.handle(Event::Activate).await.unwrap();
    agent
}

enum Scripted {
    Respond {
        status: StatusCode,
        content_type: Option<&'static str>,
        body: Bytes,
    },
    Fail,
}

/// A scripted network. Unknown URLs answer 404; `set_offline` fails everything.
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
    offline: AtomicBool,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &Url, content_type: &'static str, body: &[u8]) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Scripted::Respond {
                status: StatusCode::OK,
                content_type: Some(content_type),
                body: Bytes::copy_from_slice(body),
            },
        );
    }

    pub fn respond(&self, url: &Url, status: StatusCode, body: &[u8]) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Scripted::Respond {
                status,
                content_type: None,
                body: Bytes::copy_from_slice(body),
            },
        );
    }

    pub fn fail(&self, url: &Url) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Fail);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self, url: &Url) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url.as_str())
            .count()
    }

    /// `Range` header of the most recent request to `url`.
    pub fn last_range(&self, url: &Url) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(u, _)| u == url.as_str())
            .and_then(|(_, range)| range.clone())
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &AgentRequest) -> Result<AgentResponse> {
        self.calls.lock().unwrap().push((
            request.url.to_string(),
            request.range_header().map(str::to_string),
        ));

        if self.offline.load(Ordering::SeqCst) {
            return Err(AgentError::network(request.url.as_str(), "offline"));
        }

        let routes = self.routes.lock().unwrap();
        match routes.get(request.url.as_str()) {
            Some(Scripted::Respond {
                status,
                content_type,
                body,
            }) => {
                let mut headers = HeaderMap::new();
                if let Some(content_type) = content_type {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
                }
                Ok(AgentResponse::new(*status, headers, body.clone()))
            }
            Some(Scripted::Fail) => Err(AgentError::network(request.url.as_str(), "connection refused")),
            None => Ok(AgentResponse::new(
                StatusCode::NOT_FOUND,
                HeaderMap::new(),
                Bytes::new(),
            )),
        }
    }
}
