use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderName, HOST};
use http::HeaderMap;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::agent::{AgentRequest, AgentResponse, Fetcher};
use crate::error::{AgentError, Result};

// Base back-off between retries, doubled on each attempt
const RETRY_DELAY: Duration = Duration::from_millis(500);

const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub(crate) fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Real network access over HTTP/1.1, plain or TLS.
pub struct HttpFetcher {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    request_timeout: Duration,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(request_timeout: Duration, max_retries: u32) -> Self {
        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            request_timeout,
            max_retries,
        }
    }

    fn create_request(request: &AgentRequest) -> Result<Request<Full<Bytes>>> {
        let uri: Uri = request
            .url
            .as_str()
            .parse()
            .map_err(|_| AgentError::InvalidUrl(request.url.to_string()))?;

        let mut builder = Request::builder().method(request.method.clone()).uri(uri);
        for (key, value) in request.headers.iter() {
            // the client derives Host from the URI
            if key != HOST && !is_hop_by_hop(key) {
                builder = builder.header(key, value);
            }
        }
        Ok(builder.body(Full::new(request.body.clone()))?)
    }

    async fn fetch_once(&self, request: &AgentRequest) -> Result<AgentResponse> {
        let url = request.url.as_str();
        let req = Self::create_request(request)?;

        let attempt = async {
            let response = self
                .client
                .request(req)
                .await
                .map_err(|e| AgentError::network(url, e))?;
            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| AgentError::network(url, e))?
                .to_bytes();
            Ok::<_, AgentError>((parts, body))
        };

        let (parts, body) = timeout(self.request_timeout, attempt)
            .await
            .map_err(|_| AgentError::Timeout(url.to_string()))??;

        Ok(AgentResponse::new(parts.status, strip_hop_by_hop(parts.headers), body))
    }
}

pub(crate) fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &AgentRequest) -> Result<AgentResponse> {
        let mut current_retry = 0;
        loop {
            if current_retry > 0 {
                let delay = RETRY_DELAY * 2_u32.pow(current_retry - 1);
                tokio::time::sleep(delay).await;
                debug!(
                    url = %request.url,
                    attempt = current_retry,
                    max = self.max_retries,
                    "Retrying request"
                );
            }

            match self.fetch_once(request).await {
                Ok(response) => return Ok(response),
                Err(e @ (AgentError::InvalidUrl(_) | AgentError::Http(_))) => return Err(e),
                Err(e) if current_retry >= self.max_retries => return Err(e),
                Err(e) => warn!(url = %request.url, error = %e, "Upstream request failed"),
            }
            current_retry += 1;
        }
    }
}
