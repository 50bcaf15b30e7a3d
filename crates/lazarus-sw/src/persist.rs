//! File-backed cache storage.
//!
//! All caches live in one JSON document under the storage directory. A
//! mutation is applied to a staged copy first; the copy is written to a temp
//! file, synced and renamed over the document, and only then does the change
//! become visible. A failed write leaves both memory and disk untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lazarus_net::Response;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::cache::{CacheEntry, CacheStorage, MemoryCacheStorage};
use crate::AgentError;

const STORAGE_FILE: &str = "cache-storage.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StorageFile {
    caches: BTreeMap<String, Vec<CacheEntry>>,
}

/// Cache storage persisted to a directory.
pub struct FileCacheStorage {
    path: PathBuf,
    inner: MemoryCacheStorage,
    /// Serializes stage-write-commit so snapshots land in order.
    write_lock: Mutex<()>,
}

impl FileCacheStorage {
    /// Load the storage in `dir`, creating the directory if needed.
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self, AgentError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(STORAGE_FILE);

        let saved = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<StorageFile>(&bytes).map_err(|e| {
                AgentError::cache(format!("corrupt storage file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StorageFile::default(),
            Err(e) => return Err(e.into()),
        };

        info!(
            path = %path.display(),
            caches = saved.caches.len(),
            "Cache storage loaded"
        );

        Ok(Self {
            path,
            inner: MemoryCacheStorage::from_entries(saved.caches),
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the backing JSON file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the committed caches to apply a mutation to before writing.
    async fn stage(&self) -> MemoryCacheStorage {
        MemoryCacheStorage::from_entries(self.inner.snapshot().await)
    }

    async fn persist(&self, staged: &MemoryCacheStorage) -> Result<(), AgentError> {
        let file = StorageFile {
            caches: staged.snapshot().await,
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| AgentError::cache(format!("serializing caches: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        let mut out = tokio::fs::File::create(&tmp).await?;
        out.write_all(&json).await?;
        out.sync_all().await?;
        drop(out);
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), bytes = json.len(), "Cache storage saved");
        Ok(())
    }
}

#[async_trait]
impl CacheStorage for FileCacheStorage {
    async fn open(&self, name: &str) -> Result<(), AgentError> {
        let _guard = self.write_lock.lock().await;
        if self.inner.has(name).await? {
            return Ok(());
        }
        let staged = self.stage().await;
        staged.open(name).await?;
        self.persist(&staged).await?;
        self.inner.commit(staged).await;
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, AgentError> {
        self.inner.has(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool, AgentError> {
        let _guard = self.write_lock.lock().await;
        if !self.inner.has(name).await? {
            return Ok(false);
        }
        let staged = self.stage().await;
        staged.delete(name).await?;
        self.persist(&staged).await?;
        self.inner.commit(staged).await;
        Ok(true)
    }

    async fn keys(&self) -> Result<Vec<String>, AgentError> {
        self.inner.keys().await
    }

    async fn match_request(&self, name: &str, url: &Url) -> Result<Option<Response>, AgentError> {
        self.inner.match_request(name, url).await
    }

    async fn put(&self, name: &str, url: &Url, response: &Response) -> Result<(), AgentError> {
        let _guard = self.write_lock.lock().await;
        let staged = self.stage().await;
        staged.put(name, url, response).await?;
        self.persist(&staged).await?;
        self.inner.commit(staged).await;
        Ok(())
    }

    async fn put_all(&self, name: &str, entries: &[(Url, Response)]) -> Result<(), AgentError> {
        let _guard = self.write_lock.lock().await;
        let staged = self.stage().await;
        staged.put_all(name, entries).await?;
        self.persist(&staged).await?;
        self.inner.commit(staged).await;
        Ok(())
    }

    async fn cached_urls(&self, name: &str) -> Result<Vec<String>, AgentError> {
        self.inner.cached_urls(name).await
    }
}
