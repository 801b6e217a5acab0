use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_RANGE, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use offline_agent::agent::{AgentState, MessageOutcome};
use offline_agent::cache::RequestKey;
use offline_agent::{
    Agent, AgentConfig, AgentError, AgentRequest, AgentResponse, CacheStorage, Event, Fetcher,
    Outcome,
};
use serde_json::json;
use url::Url;

#[derive(Default)]
struct Network {
    pages: Mutex<HashMap<String, (&'static str, Bytes)>>,
    down: AtomicBool,
}

impl Network {
    fn put(&self, url: &Url, content_type: &'static str, body: impl Into<Bytes>) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), (content_type, body.into()));
    }
}

#[async_trait]
impl Fetcher for Network {
    async fn fetch(&self, request: &AgentRequest) -> offline_agent::Result<AgentResponse> {
        if self.down.load(Ordering::SeqCst) {
            return Err(AgentError::network(request.url.as_str(), "network down"));
        }
        let pages = self.pages.lock().unwrap();
        Ok(match pages.get(request.url.as_str()) {
            Some((content_type, body)) => {
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
                AgentResponse::new(StatusCode::OK, headers, body.clone())
            }
            None => AgentResponse::new(StatusCode::NOT_FOUND, HeaderMap::new(), Bytes::new()),
        })
    }
}

fn config(version: &str) -> AgentConfig {
    AgentConfig {
        origin: Url::parse("http://gym.local/").unwrap(),
        version: version.to_string(),
        install_manifest: vec!["/MagicTraining/".into(), "/MagicTraining/manifest.json".into()],
        offline_document: "/MagicTraining/".into(),
        ..AgentConfig::default()
    }
}

async fn fetch(agent: &Arc<Agent>, request: AgentRequest) -> AgentResponse {
    agent
        .dispatch(Event::Fetch(request))
        .wait()
        .await
        .unwrap()
        .into_response()
        .unwrap()
}

#[tokio::test]
async fn full_lifecycle_then_offline_use() {
    let v1 = config("v1");
    let network = Arc::new(Network::default());
    network.put(&v1.resolve("/MagicTraining/").unwrap(), "text/html", "shell");
    network.put(
        &v1.resolve("/MagicTraining/manifest.json").unwrap(),
        "application/json",
        "{}",
    );
    let video: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
    network.put(&v1.resolve("/videos/warmup.mp4").unwrap(), "video/mp4", video.clone());

    let storage = Arc::new(CacheStorage::in_memory());
    let agent = Arc::new(Agent::new(v1.clone(), storage.clone(), network.clone()));

    let installed = agent.dispatch(Event::Install).wait().await.unwrap();
    assert!(matches!(installed, Outcome::Installed { cached: 2, .. }));
    agent.dispatch(Event::Activate).wait().await.unwrap();
    assert_eq!(agent.state().await, AgentState::Activated);

    let handled = agent
        .dispatch(Event::Message(json!({
            "action": "CACHE_VIDEOS",
            "videos": [{"url": "/videos/warmup.mp4", "filename": "warmup.mp4"}]
        })))
        .wait()
        .await
        .unwrap();
    assert!(matches!(
        handled,
        Outcome::Message(MessageOutcome::CachedVideos(ref report)) if report.cached.len() == 1
    ));

    network.down.store(true, Ordering::SeqCst);

    let page = fetch(&agent, AgentRequest::navigate(v1.resolve("/MagicTraining/").unwrap())).await;
    assert_eq!(page.body().as_ref(), b"shell");

    let fallback = fetch(
        &agent,
        AgentRequest::navigate(v1.resolve("/MagicTraining/settings").unwrap()),
    )
    .await;
    assert_eq!(fallback.body().as_ref(), b"shell");

    let seek = fetch(
        &agent,
        AgentRequest::get(v1.resolve("/cache/warmup.mp4").unwrap()).with_range("bytes=100-199"),
    )
    .await;
    assert_eq!(seek.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(seek.body().as_ref(), &video[100..200]);
    assert_eq!(
        seek.headers().get(CONTENT_RANGE).unwrap(),
        "bytes 100-199/1000"
    );
}

#[tokio::test]
async fn version_bump_drops_previous_generation() {
    let network = Arc::new(Network::default());
    let storage = Arc::new(CacheStorage::in_memory());

    for version in ["v1", "v2"] {
        let config = config(version);
        for path in &config.install_manifest {
            network.put(&config.resolve(path).unwrap(), "text/html", version.to_string());
        }
        let agent = Arc::new(Agent::new(config, storage.clone(), network.clone()));
        agent.dispatch(Event::Install).wait().await.unwrap();
        agent.dispatch(Event::Activate).wait().await.unwrap();
    }

    assert_eq!(
        storage.keys().await.unwrap(),
        vec!["magic-training-v2".to_string()]
    );
    let key = RequestKey::get(&config("v2").resolve("/MagicTraining/").unwrap());
    let shell = storage.match_any(&key).await.unwrap().unwrap();
    assert_eq!(shell.body().as_ref(), b"v2");
}

#[tokio::test]
async fn cached_entries_are_stable_across_requests() {
    let cfg = config("v1");
    let network = Arc::new(Network::default());
    let url = cfg.resolve("/MagicTraining/app.js").unwrap();
    network.put(&url, "text/javascript", "first");
    let agent = Arc::new(Agent::new(
        cfg,
        Arc::new(CacheStorage::in_memory()),
        network.clone(),
    ));
    agent.dispatch(Event::Activate).wait().await.unwrap();

    let first = fetch(&agent, AgentRequest::get(url.clone())).await;
    network.put(&url, "text/javascript", "second");
    for _ in 0..3 {
        let again = fetch(&agent, AgentRequest::get(url.clone())).await;
        assert_eq!(again.body(), first.body());
    }
}
