//! The request interception agent.
//!
//! Every interaction is an [`Event`]. [`Agent::handle`] runs one to
//! completion; [`Agent::dispatch`] runs it on its own task and hands back an
//! [`EventHandle`] the host must wait on before it treats the event as done.

mod bulk;
mod fetcher;
mod lifecycle;
mod range;
mod request;
mod router;
mod video;

pub use bulk::{BulkReport, Command, VideoDescriptor};
pub use fetcher::Fetcher;
pub use range::ByteRange;
pub use request::{AgentRequest, AgentResponse, RequestMode, ResponseKind};

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{CacheStorage, RequestKey};
use crate::config::AgentConfig;
use crate::error::{AgentError, Result};

#[derive(Debug)]
pub enum Event {
    Install,
    Activate,
    Fetch(AgentRequest),
    /// A JSON command posted by the hosting page.
    Message(serde_json::Value),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Install => "install",
            Event::Activate => "activate",
            Event::Fetch(_) => "fetch",
            Event::Message(_) => "message",
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Installed { cached: usize, skip_waiting: bool },
    Activated { removed: Vec<String> },
    Response(AgentResponse),
    Message(MessageOutcome),
}

impl Outcome {
    pub fn into_response(self) -> Option<AgentResponse> {
        match self {
            Outcome::Response(response) => Some(response),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum MessageOutcome {
    CachedVideos(BulkReport),
    Ignored(String),
}

/// Lifecycle position. Fetches are only intercepted once `Activated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Parsed,
    Installed,
    Activated,
}

/// Pending completion of a dispatched event.
#[derive(Debug)]
pub struct EventHandle {
    event: &'static str,
    task: JoinHandle<Result<Outcome>>,
}

impl EventHandle {
    pub fn event(&self) -> &'static str {
        self.event
    }

    pub async fn wait(self) -> Result<Outcome> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(AgentError::Task(format!("{} handler: {e}", self.event))),
        }
    }
}

pub struct Agent {
    config: AgentConfig,
    storage: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    state: RwLock<AgentState>,
}

impl Agent {
    pub fn new(config: AgentConfig, storage: Arc<CacheStorage>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            storage,
            fetcher,
            state: RwLock::new(AgentState::Parsed),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<CacheStorage> {
        &self.storage
    }

    pub async fn state(&self) -> AgentState {
        *self.state.read().await
    }

    pub async fn handle(&self, event: Event) -> Result<Outcome> {
        debug!(event = event.name(), "Handling event");
        match event {
            Event::Install => self.install().await,
            Event::Activate => self.activate().await,
            Event::Fetch(request) => Ok(Outcome::Response(self.respond(request).await)),
            Event::Message(payload) => Ok(Outcome::Message(self.handle_message(payload).await)),
        }
    }

    pub fn dispatch(self: &Arc<Self>, event: Event) -> EventHandle {
        let agent = Arc::clone(self);
        let name = event.name();
        EventHandle {
            event: name,
            task: tokio::spawn(async move { agent.handle(event).await }),
        }
    }

    async fn set_state(&self, state: AgentState) {
        *self.state.write().await = state;
    }

    async fn is_controlling(&self) -> bool {
        self.state().await == AgentState::Activated
    }

    /// Opens `partition` and stores `response`, logging instead of failing.
    async fn store(&self, partition: &str, key: RequestKey, response: AgentResponse) {
        let result: Result<()> = async {
            let partition = self.storage.open(partition).await?;
            partition.put(key.clone(), response).await
        }
        .await;

        match result {
            Ok(()) => debug!(partition, key = %key, "Stored response"),
            Err(e) => warn!(partition, key = %key, error = %e, "Failed to store response"),
        }
    }

    /// Cache lookup across all partitions; storage errors count as a miss.
    async fn lookup_any(&self, key: &RequestKey) -> Option<AgentResponse> {
        match self.storage.match_any(key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache lookup failed");
                None
            }
        }
    }
}
