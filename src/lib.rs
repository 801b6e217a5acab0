//! Offline request interception agent.
//!
//! Serves an app's requests from versioned cache partitions: cache-first for
//! sub-resources, network-first for page loads, and byte-range slicing for
//! cached video so media players can seek offline.

pub mod agent;
pub mod cache;
pub mod config;
pub mod error;
pub mod proxy;

#[cfg(test)]
pub(crate) mod test_utils;

pub use agent::{Agent, AgentRequest, AgentResponse, Event, EventHandle, Fetcher, Outcome};
pub use cache::CacheStorage;
pub use config::{AgentConfig, Config, ServerConfig};
pub use error::{AgentError, Result};
