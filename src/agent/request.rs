use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, RANGE};
use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::RequestKey;

/// How the requesting context issued the request, as reported by `Sec-Fetch-Mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// A full document load: address bar, link click, reload.
    Navigate,
    SameOrigin,
    #[default]
    Cors,
    NoCors,
}

impl RequestMode {
    pub fn from_sec_fetch_mode(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => Some(RequestMode::Navigate),
            "same-origin" => Some(RequestMode::SameOrigin),
            "cors" => Some(RequestMode::Cors),
            "no-cors" => Some(RequestMode::NoCors),
            _ => None,
        }
    }
}

/// Visibility class of a response relative to the app's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Same-origin, fully inspectable.
    Basic,
    Cors,
    /// Cross-origin `no-cors` response; never written to a partition.
    Opaque,
    /// Produced locally (offline page, JSON error, range slice of nothing).
    Synthetic,
}

#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub mode: RequestMode,
    pub body: Bytes,
}

impl AgentRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            mode: RequestMode::default(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_mode(RequestMode::Navigate)
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_range(self, range: &str) -> Self {
        match HeaderValue::from_str(range) {
            Ok(value) => self.with_header(RANGE, value),
            Err(_) => self,
        }
    }

    pub fn range_header(&self) -> Option<&str> {
        self.headers.get(RANGE).and_then(|h| h.to_str().ok())
    }

    /// Copy of this request that asks for the whole resource.
    pub fn without_range(&self) -> Self {
        let mut request = self.clone();
        request.headers.remove(RANGE);
        request
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.method.clone(), &self.url)
    }

    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Kind a response to this request would carry when seen from `origin`.
    pub fn response_kind(&self, origin: &Url) -> ResponseKind {
        if self.is_same_origin(origin) {
            ResponseKind::Basic
        } else if self.mode == RequestMode::NoCors {
            ResponseKind::Opaque
        } else {
            ResponseKind::Cors
        }
    }
}

/// A fully buffered response.
///
/// It is deliberately not `Clone`: a response handed to a caller and a copy
/// persisted in a partition must be split with [`AgentResponse::tee`], which
/// consumes the original.
#[derive(Debug)]
pub struct AgentResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    kind: ResponseKind,
}

impl AgentResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            kind: ResponseKind::Basic,
        }
    }

    pub fn synthetic(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self {
            status,
            headers,
            body: body.into(),
            kind: ResponseKind::Synthetic,
        }
    }

    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::synthetic(status, "application/json", value.to_string())
    }

    pub fn with_kind(mut self, kind: ResponseKind) -> Self {
        self.kind = kind;
        self
    }

    /// Splits the response into two independent copies.
    pub fn tee(self) -> (Self, Self) {
        let copy = Self {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            kind: self.kind,
        };
        (self, copy)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    pub fn content_type(&self) -> Option<&HeaderValue> {
        self.headers.get(CONTENT_TYPE)
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body)
    }
}
