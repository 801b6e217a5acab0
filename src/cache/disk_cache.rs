use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::{CacheEntry, EntryMeta, RequestKey};
use crate::error::Result;

const META_EXTENSION: &str = "meta";
const BODY_EXTENSION: &str = "body";

/// On-disk half of a partition: one directory, two files per entry.
#[derive(Debug)]
pub struct DiskCache {
    cache_dir: PathBuf,
}

impl DiskCache {
    pub async fn open(cache_dir: PathBuf) -> io::Result<Self> {
        if !fs::try_exists(&cache_dir).await? {
            fs::create_dir_all(&cache_dir).await?;
        }
        Ok(Self { cache_dir })
    }

    fn entry_path(&self, key: &RequestKey) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.to_string().as_bytes());
        let hash = hex::encode(hasher.finalize());
        self.cache_dir.join(hash)
    }

    /// Body first, metadata last: an entry without metadata does not exist.
    pub async fn save(&self, key: &RequestKey, entry: &CacheEntry) -> Result<()> {
        let path = self.entry_path(key);
        fs::write(path.with_extension(BODY_EXTENSION), &entry.data).await?;
        let meta = serde_json::to_vec(&entry.meta)?;
        fs::write(path.with_extension(META_EXTENSION), meta).await?;
        Ok(())
    }

    pub async fn load(&self, key: &RequestKey) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key);
        let meta_path = path.with_extension(META_EXTENSION);
        if !fs::try_exists(&meta_path).await? {
            return Ok(None);
        }

        let meta: EntryMeta = serde_json::from_slice(&fs::read(&meta_path).await?)?;
        let data = match fs::read(path.with_extension(BODY_EXTENSION)).await {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(CacheEntry { meta, data }))
    }

    pub async fn remove(&self, key: &RequestKey) -> Result<bool> {
        let path = self.entry_path(key);
        let existed = remove_if_exists(&path.with_extension(META_EXTENSION)).await?;
        remove_if_exists(&path.with_extension(BODY_EXTENSION)).await?;
        Ok(existed)
    }

    pub async fn keys(&self) -> Result<Vec<RequestKey>> {
        let mut keys = Vec::new();
        let mut dir = fs::read_dir(&self.cache_dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(META_EXTENSION) {
                continue;
            }
            let meta: EntryMeta = serde_json::from_slice(&fs::read(&path).await?)?;
            if let Some(key) = meta.request_key() {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
