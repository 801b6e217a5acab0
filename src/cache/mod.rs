mod disk_cache;
mod partition;
mod storage;

pub use disk_cache::*;
pub use partition::*;
pub use storage::*;

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::agent::{AgentResponse, ResponseKind};

/// Entries this size or larger stay on disk only when a disk store exists.
pub const MAX_MEMORY_ENTRY_SIZE: usize = 100 * 1024 * 1024; // 100MB

/// Identity of a stored request: method plus absolute URL.
///
/// Request headers, `Range` included, are not part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    method: Method,
    url: String,
}

impl RequestKey {
    pub fn new(method: Method, url: &Url) -> Self {
        Self {
            method,
            url: url.as_str().to_string(),
        }
    }

    pub fn get(url: &Url) -> Self {
        Self::new(Method::GET, url)
    }

    fn parse(raw: &str) -> Option<Self> {
        let (method, url) = raw.split_once(' ')?;
        let method = Method::from_bytes(method.as_bytes()).ok()?;
        Some(Self {
            method,
            url: url.to_string(),
        })
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Everything about a stored response except its body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMeta {
    pub key: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub kind: ResponseKind,
    pub size: usize,
    pub cached_at: DateTime<Utc>,
}

impl EntryMeta {
    pub fn request_key(&self) -> Option<RequestKey> {
        RequestKey::parse(&self.key)
    }
}

/// A response snapshot as held by a partition.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub meta: EntryMeta,
    pub data: Bytes,
}

impl CacheEntry {
    pub fn from_response(key: &RequestKey, response: AgentResponse) -> Self {
        let kind = response.kind();
        let (status, headers, data) = response.into_parts();
        let headers = headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        Self {
            meta: EntryMeta {
                key: key.to_string(),
                status: status.as_u16(),
                headers,
                kind,
                size: data.len(),
                cached_at: Utc::now(),
            },
            data,
        }
    }

    /// Materializes a fresh response; every lookup gets its own copy.
    pub fn to_response(&self) -> AgentResponse {
        let status = StatusCode::from_u16(self.meta.status).unwrap_or(StatusCode::OK);
        let mut headers = HeaderMap::with_capacity(self.meta.headers.len());
        for (name, value) in &self.meta.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }
        AgentResponse::new(status, headers, self.data.clone()).with_kind(self.meta.kind)
    }
}
