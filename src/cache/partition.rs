use std::collections::{BTreeSet, HashMap};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{CacheEntry, DiskCache, RequestKey};
use crate::agent::AgentResponse;
use crate::error::Result;

/// A named key→response store.
///
/// Small entries live in memory and are written through to disk; entries of
/// `max_memory_entry_size` bytes or more are kept on disk only.
#[derive(Debug)]
pub struct Partition {
    name: String,
    memory: RwLock<HashMap<RequestKey, CacheEntry>>,
    disk: Option<DiskCache>,
    max_memory_entry_size: usize,
}

impl Partition {
    pub(crate) fn new(name: String, disk: Option<DiskCache>, max_memory_entry_size: usize) -> Self {
        Self {
            name,
            memory: RwLock::new(HashMap::new()),
            disk,
            max_memory_entry_size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self, key: &RequestKey) -> Result<Option<AgentResponse>> {
        if let Some(entry) = self.memory.read().await.get(key) {
            return Ok(Some(entry.to_response()));
        }

        let Some(disk) = &self.disk else {
            return Ok(None);
        };
        let Some(entry) = disk.load(key).await? else {
            return Ok(None);
        };

        let response = entry.to_response();
        if entry.meta.size < self.max_memory_entry_size {
            self.memory.write().await.insert(key.clone(), entry);
        }
        Ok(Some(response))
    }

    pub async fn contains(&self, key: &RequestKey) -> Result<bool> {
        if self.memory.read().await.contains_key(key) {
            return Ok(true);
        }
        match &self.disk {
            Some(disk) => Ok(disk.load(key).await?.is_some()),
            None => Ok(false),
        }
    }

    /// Stores `response` under `key`, replacing any previous entry.
    ///
    /// Takes the response by value; callers that also need to hand it out
    /// split it with [`AgentResponse::tee`] first.
    pub async fn put(&self, key: RequestKey, response: AgentResponse) -> Result<()> {
        let entry = CacheEntry::from_response(&key, response);
        let size = entry.meta.size;

        match &self.disk {
            Some(disk) if size >= self.max_memory_entry_size => {
                disk.save(&key, &entry).await?;
                self.memory.write().await.remove(&key);
                debug!(partition = %self.name, key = %key, size, "Stored entry on disk only");
            }
            Some(disk) => {
                disk.save(&key, &entry).await?;
                self.memory.write().await.insert(key, entry);
            }
            None => {
                self.memory.write().await.insert(key, entry);
            }
        }
        Ok(())
    }

    pub async fn put_all(&self, entries: Vec<(RequestKey, AgentResponse)>) -> Result<()> {
        for (key, response) in entries {
            self.put(key, response).await?;
        }
        Ok(())
    }

    pub async fn delete(&self, key: &RequestKey) -> Result<bool> {
        let in_memory = self.memory.write().await.remove(key).is_some();
        let on_disk = match &self.disk {
            Some(disk) => disk.remove(key).await?,
            None => false,
        };
        Ok(in_memory || on_disk)
    }

    pub async fn keys(&self) -> Result<Vec<RequestKey>> {
        let mut keys: BTreeSet<String> = BTreeSet::new();
        let mut found = Vec::new();

        for key in self.memory.read().await.keys() {
            if keys.insert(key.to_string()) {
                found.push(key.clone());
            }
        }
        if let Some(disk) = &self.disk {
            match disk.keys().await {
                Ok(disk_keys) => {
                    for key in disk_keys {
                        if keys.insert(key.to_string()) {
                            found.push(key);
                        }
                    }
                }
                Err(e) => warn!(partition = %self.name, error = %e, "Failed to list disk entries"),
            }
        }

        found.sort_by_key(|k| k.to_string());
        Ok(found)
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.keys().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
