use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{DiskCache, Partition, RequestKey, MAX_MEMORY_ENTRY_SIZE};
use crate::agent::AgentResponse;
use crate::error::Result;

/// The set of named partitions, optionally rooted in a directory.
///
/// On disk each partition is a directory whose name is the hex encoding of
/// the partition name, so names can be listed back without an index file.
#[derive(Debug)]
pub struct CacheStorage {
    root: Option<PathBuf>,
    max_memory_entry_size: usize,
    partitions: RwLock<HashMap<String, Arc<Partition>>>,
}

impl CacheStorage {
    pub fn in_memory() -> Self {
        Self {
            root: None,
            max_memory_entry_size: MAX_MEMORY_ENTRY_SIZE,
            partitions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn persistent(root: PathBuf, max_memory_entry_size: usize) -> io::Result<Self> {
        if !fs::try_exists(&root).await? {
            fs::create_dir_all(&root).await?;
        }
        info!(root = %root.display(), "Cache storage opened");
        Ok(Self {
            root: Some(root),
            max_memory_entry_size,
            partitions: RwLock::new(HashMap::new()),
        })
    }

    fn partition_dir(&self, name: &str) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(hex::encode(name)))
    }

    /// Opens the partition called `name`, creating it if needed.
    pub async fn open(&self, name: &str) -> Result<Arc<Partition>> {
        if let Some(partition) = self.partitions.read().await.get(name) {
            return Ok(partition.clone());
        }

        let mut partitions = self.partitions.write().await;
        if let Some(partition) = partitions.get(name) {
            return Ok(partition.clone());
        }

        let disk = match self.partition_dir(name) {
            Some(dir) => Some(DiskCache::open(dir).await?),
            None => None,
        };
        let partition = Arc::new(Partition::new(
            name.to_string(),
            disk,
            self.max_memory_entry_size,
        ));
        partitions.insert(name.to_string(), partition.clone());
        debug!(partition = name, "Partition opened");
        Ok(partition)
    }

    pub async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.keys().await?.iter().any(|n| n == name))
    }

    /// Names of every existing partition, sorted.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let mut names: BTreeSet<String> = self.partitions.read().await.keys().cloned().collect();

        if let Some(root) = &self.root {
            let mut dir = fs::read_dir(root).await?;
            while let Some(item) = dir.next_entry().await? {
                if !item.file_type().await?.is_dir() {
                    continue;
                }
                let dir_name = item.file_name();
                let decoded = dir_name
                    .to_str()
                    .and_then(|n| hex::decode(n).ok())
                    .and_then(|bytes| String::from_utf8(bytes).ok());
                match decoded {
                    Some(name) => {
                        names.insert(name);
                    }
                    None => warn!(dir = ?dir_name, "Ignoring unrecognised directory in cache root"),
                }
            }
        }

        Ok(names.into_iter().collect())
    }

    /// Deletes the partition and everything in it. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let in_memory = self.partitions.write().await.remove(name).is_some();
        let on_disk = match self.partition_dir(name) {
            Some(dir) => match fs::remove_dir_all(&dir).await {
                Ok(()) => true,
                Err(e) if e.kind() == io::ErrorKind::NotFound => false,
                Err(e) => return Err(e.into()),
            },
            None => false,
        };
        Ok(in_memory || on_disk)
    }

    /// Looks `key` up in every partition, in name order.
    pub async fn match_any(&self, key: &RequestKey) -> Result<Option<AgentResponse>> {
        for name in self.keys().await? {
            let partition = self.open(&name).await?;
            if let Some(response) = partition.get(key).await? {
                debug!(partition = %name, key = %key, "Cache match");
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}
