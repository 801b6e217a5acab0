use async_trait::async_trait;

use super::{AgentRequest, AgentResponse};
use crate::error::Result;

/// The agent's only way to reach the network.
///
/// Any HTTP status is a successful fetch; `Err` means the request never got
/// a response (connection refused, DNS failure, timeout).
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &AgentRequest) -> Result<AgentResponse>;
}
