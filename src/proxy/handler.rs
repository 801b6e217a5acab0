use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderValue, ACCEPT, CONTENT_LENGTH};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use url::Url;

use super::upstream::strip_hop_by_hop;
use crate::agent::{Agent, AgentRequest, AgentResponse, Event, RequestMode};
use crate::error::{AgentError, Result};

const SEC_FETCH_MODE: &str = "sec-fetch-mode";

/// Per-connection state shared by every request the host serves.
#[derive(Clone)]
pub struct HandlerContext {
    pub agent: Arc<Agent>,
    pub semaphore: Arc<Semaphore>,
    pub control_path: Arc<str>,
}

pub async fn handle_request(
    req: Request<Incoming>,
    ctx: HandlerContext,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let Ok(_permit) = ctx.semaphore.acquire().await else {
        return Ok(plain(StatusCode::SERVICE_UNAVAILABLE, "Shutting down"));
    };

    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(uri = %parts.uri, error = %e, "Failed to read request body");
            return Ok(plain(StatusCode::BAD_REQUEST, "Unreadable request body"));
        }
    };

    if parts.method == Method::POST && parts.uri.path() == &*ctx.control_path {
        return Ok(deliver_message(&ctx.agent, &body));
    }

    let request = match to_agent_request(parts, body, &ctx.agent.config().origin) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Rejecting request");
            return Ok(plain(StatusCode::BAD_REQUEST, "Bad request target"));
        }
    };

    debug!(method = %request.method, url = %request.url, mode = ?request.mode, "Intercepted request");
    let response = match ctx.agent.dispatch(Event::Fetch(request)).wait().await {
        Ok(outcome) => match outcome.into_response() {
            Some(response) => response,
            None => AgentResponse::synthetic(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain; charset=utf-8",
                "No response",
            ),
        },
        Err(e) => {
            error!(error = %e, "Fetch handler failed");
            AgentResponse::synthetic(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain; charset=utf-8",
                "Agent failure",
            )
        }
    };

    Ok(into_hyper(response))
}

/// Fire-and-forget: the sender gets 202 while the agent works in the background.
fn deliver_message(agent: &Arc<Agent>, body: &Bytes) -> Response<Full<Bytes>> {
    let payload: serde_json::Value = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Control message is not JSON");
            return plain(StatusCode::BAD_REQUEST, "Expected a JSON message");
        }
    };

    let handle = agent.dispatch(Event::Message(payload));
    tokio::spawn(async move {
        let event = handle.event();
        match handle.wait().await {
            Ok(outcome) => info!(event, outcome = ?outcome, "Message handled"),
            Err(e) => error!(event, error = %e, "Message handler failed"),
        }
    });

    plain(StatusCode::ACCEPTED, "Accepted")
}

/// Absolute-form targets are used as-is; origin-form targets resolve against `origin`.
pub(crate) fn to_agent_request(
    parts: http::request::Parts,
    body: Bytes,
    origin: &Url,
) -> Result<AgentRequest> {
    let target = parts.uri.to_string();
    let url = if parts.uri.scheme().is_some() {
        Url::parse(&target)
    } else {
        origin.join(&target)
    }
    .map_err(|_| AgentError::InvalidUrl(target.clone()))?;

    let mode = parts
        .headers
        .get(SEC_FETCH_MODE)
        .and_then(|v| v.to_str().ok())
        .and_then(RequestMode::from_sec_fetch_mode)
        .unwrap_or_else(|| {
            let wants_html = parts
                .headers
                .get(ACCEPT)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|accept| accept.contains("text/html"));
            if parts.method == Method::GET && wants_html {
                RequestMode::Navigate
            } else {
                RequestMode::default()
            }
        });

    Ok(AgentRequest {
        method: parts.method,
        url,
        headers: parts.headers,
        mode,
        body,
    })
}

pub(crate) fn into_hyper(response: AgentResponse) -> Response<Full<Bytes>> {
    let (status, headers, body) = response.into_parts();
    let mut headers = strip_hop_by_hop(headers);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));

    let mut res = Response::new(Full::new(body));
    *res.status_mut() = status;
    *res.headers_mut() = headers;
    res
}

fn plain(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    into_hyper(AgentResponse::synthetic(
        status,
        "text/plain; charset=utf-8",
        message,
    ))
}
