use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use super::handler::{handle_request, HandlerContext};
use super::upstream::HttpFetcher;
use crate::agent::{Agent, Event, Outcome};
use crate::cache::CacheStorage;
use crate::config::Config;
use crate::error::{AgentError, Result};

/// Hosts the agent behind an HTTP/1.1 listener, playing the browser's part:
/// lifecycle events at startup, one fetch event per request.
pub struct ProxyServer {
    addr: SocketAddr,
    agent: Arc<Agent>,
    semaphore: Arc<Semaphore>,
    control_path: Arc<str>,
}

impl ProxyServer {
    pub async fn new(config: Config) -> Result<Self> {
        let server = config.server;
        let storage = match &server.cache_dir {
            Some(dir) => CacheStorage::persistent(dir.clone(), server.max_memory_entry_size).await?,
            None => CacheStorage::in_memory(),
        };
        let fetcher = HttpFetcher::new(server.request_timeout(), server.max_retries);
        let agent = Agent::new(config.agent, Arc::new(storage), Arc::new(fetcher));

        Ok(Self::with_agent(
            server.listen,
            Arc::new(agent),
            server.max_connections,
            &server.control_path,
        ))
    }

    pub fn with_agent(
        addr: SocketAddr,
        agent: Arc<Agent>,
        max_connections: usize,
        control_path: &str,
    ) -> Self {
        Self {
            addr,
            agent,
            semaphore: Arc::new(Semaphore::new(max_connections)),
            control_path: Arc::from(control_path),
        }
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    /// Runs install then activate, waiting on each before serving.
    ///
    /// A manifest fetch failure is only fatal when the current generation is
    /// not already complete on disk; otherwise the stored copy keeps serving.
    pub async fn bootstrap(&self) -> Result<()> {
        match self.agent.dispatch(Event::Install).wait().await {
            Ok(Outcome::Installed { cached, .. }) => info!(cached, "Agent installed"),
            Ok(_) => {}
            Err(e @ AgentError::PartialManifestFailure { .. }) => {
                match self.agent.verify_install().await {
                    Ok(cached) => warn!(
                        cached,
                        error = %e,
                        "Install failed, serving the generation already in storage"
                    ),
                    Err(missing) => {
                        error!(error = %missing, "No complete install to fall back on");
                        return Err(e);
                    }
                }
            }
            Err(e) => return Err(e),
        }
        if let Outcome::Activated { removed } = self.agent.dispatch(Event::Activate).wait().await? {
            info!(removed = ?removed, "Agent activated");
        }
        Ok(())
    }

    pub async fn run(&self) -> Result<()> {
        self.bootstrap().await?;
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    /// Accept loop. Expects [`ProxyServer::bootstrap`] to have completed.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        let config = self.agent.config();
        info!(
            addr = %addr,
            origin = %config.origin,
            assets = %config.asset_partition(),
            videos = %config.video_partition(),
            max_connections = self.semaphore.available_permits(),
            "Interception proxy listening"
        );

        let ctx = HandlerContext {
            agent: self.agent.clone(),
            semaphore: self.semaphore.clone(),
            control_path: self.control_path.clone(),
        };

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            let ctx = ctx.clone();
            tokio::spawn(async move {
                debug!(peer = %peer, "Accepted connection");
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| handle_request(req, ctx.clone()));
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(peer = %peer, error = %e, "Connection closed with error");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use http::StatusCode;

    use super::*;
    use crate::agent::{AgentRequest, AgentResponse, AgentState};
    use crate::cache::{RequestKey, MAX_MEMORY_ENTRY_SIZE};
    use crate::test_utils::init_tracing;

    // nothing listens on the discard port
    fn offline_config(cache_dir: &Path) -> Config {
        let mut config = Config::default();
        config.agent.origin = "http://127.0.0.1:9/".parse().unwrap();
        config.agent.install_manifest =
            vec!["/MagicTraining/".into(), "/MagicTraining/app.js".into()];
        config.agent.offline_document = "/MagicTraining/".into();
        config.server.cache_dir = Some(cache_dir.to_path_buf());
        config.server.request_timeout_secs = 2;
        config
    }

    #[tokio::test]
    async fn test_bootstrap_offline_uses_stored_generation() {
        init_tracing();
        let tmp = tempfile::tempdir().unwrap();
        let config = offline_config(tmp.path());

        {
            let storage = CacheStorage::persistent(tmp.path().to_path_buf(), MAX_MEMORY_ENTRY_SIZE)
                .await
                .unwrap();
            let assets = storage.open(&config.agent.asset_partition()).await.unwrap();
            for entry in &config.agent.install_manifest {
                let key = RequestKey::get(&config.agent.resolve(entry).unwrap());
                let body = format!("stored {entry}");
                assets
                    .put(key, AgentResponse::synthetic(StatusCode::OK, "text/html", body))
                    .await
                    .unwrap();
            }
        }

        let server = ProxyServer::new(config.clone()).await.unwrap();
        server.bootstrap().await.unwrap();
        assert_eq!(server.agent().state().await, AgentState::Activated);

        let shell = config.agent.resolve("/MagicTraining/").unwrap();
        let response = server
            .agent()
            .dispatch(Event::Fetch(AgentRequest::navigate(shell)))
            .wait()
            .await
            .unwrap()
            .into_response()
            .unwrap();
        assert_eq!(response.body().as_ref(), b"stored /MagicTraining/");
    }

    #[tokio::test]
    async fn test_bootstrap_offline_without_stored_generation_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let server = ProxyServer::new(offline_config(tmp.path())).await.unwrap();

        let err = server.bootstrap().await.unwrap_err();
        assert!(matches!(err, AgentError::PartialManifestFailure { .. }));
        assert_eq!(server.agent().state().await, AgentState::Parsed);
    }

    #[tokio::test]
    async fn test_bootstrap_with_incomplete_stored_generation_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let config = offline_config(tmp.path());
        {
            let storage = CacheStorage::persistent(tmp.path().to_path_buf(), MAX_MEMORY_ENTRY_SIZE)
                .await
                .unwrap();
            let assets = storage.open(&config.agent.asset_partition()).await.unwrap();
            let key = RequestKey::get(&config.agent.resolve("/MagicTraining/").unwrap());
            assets
                .put(key, AgentResponse::synthetic(StatusCode::OK, "text/html", "shell"))
                .await
                .unwrap();
        }

        let server = ProxyServer::new(config).await.unwrap();
        assert!(server.bootstrap().await.is_err());
    }
}
