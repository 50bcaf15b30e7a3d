//! Named request/response caches.
//!
//! ```text
//! CacheStorage
//!     └── Cache (by name)
//!             └── URL → CacheEntry
//! ```

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use lazarus_net::Response;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::trace;
use url::Url;

use crate::AgentError;

/// Key under which a GET request is stored: its URL without the fragment.
pub fn cache_key(url: &Url) -> String {
    let mut key = url.clone();
    key.set_fragment(None);
    key.into()
}

// ==================== Entry ====================

/// A cached request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL (cache key).
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers, in order. Values that are not visible ASCII are dropped.
    pub headers: Vec<(String, String)>,

    /// Response body.
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Capture `response` as the entry for a GET of `url`.
    pub fn from_response(url: &Url, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            url: cache_key(url),
            method: "GET".to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body().to_vec(),
            cached_at: now_millis(),
        }
    }

    /// Rebuild the stored response.
    pub fn to_response(&self) -> Result<Response, AgentError> {
        let url = Url::parse(&self.url)?;
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| AgentError::cache(format!("bad status for {}: {e}", self.url)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.append(n, v);
            }
        }

        Ok(Response::new(url, status, headers, self.body.clone()))
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

mod body_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

// ==================== Cache ====================

/// A single named cache.
#[derive(Debug, Default, Clone)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request by cache key.
    pub fn match_request(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Add or overwrite an entry.
    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.url.clone(), entry);
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Get all keys (URLs), sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(|s| s.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by key.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.url.cmp(&b.url));
        entries
    }
}

// ==================== Cache Storage ====================

/// Persistent named key/value caches provided by the host.
///
/// Each operation is atomic on its own. Writes to the same key are
/// last-write-wins.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a cache, creating it if it doesn't exist.
    async fn open(&self, name: &str) -> Result<(), AgentError>;

    /// Check if cache exists.
    async fn has(&self, name: &str) -> Result<bool, AgentError>;

    /// Delete a whole cache. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, AgentError>;

    /// All cache names, sorted.
    async fn keys(&self) -> Result<Vec<String>, AgentError>;

    /// Look up a GET of `url` in the named cache. A missing cache is a miss.
    async fn match_request(&self, name: &str, url: &Url) -> Result<Option<Response>, AgentError>;

    /// Store `response` for a GET of `url`, creating the cache if needed.
    async fn put(&self, name: &str, url: &Url, response: &Response) -> Result<(), AgentError>;

    /// Store a batch in one step: either every entry is written or none is.
    async fn put_all(&self, name: &str, entries: &[(Url, Response)]) -> Result<(), AgentError>;

    /// Keys of the named cache, sorted. Empty when the cache doesn't exist.
    async fn cached_urls(&self, name: &str) -> Result<Vec<String>, AgentError>;
}

/// In-memory cache storage.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<HashMap<String, Cache>>,
}

impl MemoryCacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build storage from previously saved entries.
    pub fn from_entries(saved: BTreeMap<String, Vec<CacheEntry>>) -> Self {
        let caches = saved
            .into_iter()
            .map(|(name, entries)| {
                let mut cache = Cache::new(&name);
                for entry in entries {
                    cache.put(entry);
                }
                (name, cache)
            })
            .collect();

        Self {
            caches: RwLock::new(caches),
        }
    }

    /// Copy of every cache's entries, for persistence.
    pub async fn snapshot(&self) -> BTreeMap<String, Vec<CacheEntry>> {
        self.caches
            .read()
            .await
            .iter()
            .map(|(name, cache)| (name.clone(), cache.entries()))
            .collect()
    }

    /// Replace every cache with the contents of `staged`.
    pub(crate) async fn commit(&self, staged: MemoryCacheStorage) {
        *self.caches.write().await = staged.caches.into_inner();
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<(), AgentError> {
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name));
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, AgentError> {
        Ok(self.caches.read().await.contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<bool, AgentError> {
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, AgentError> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort_unstable();
        Ok(names)
    }

    async fn match_request(&self, name: &str, url: &Url) -> Result<Option<Response>, AgentError> {
        let caches = self.caches.read().await;
        let key = cache_key(url);
        match caches.get(name).and_then(|cache| cache.match_request(&key)) {
            Some(entry) => {
                trace!(cache = name, url = %key, "Cache hit");
                entry.to_response().map(Some)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, name: &str, url: &Url, response: &Response) -> Result<(), AgentError> {
        let entry = CacheEntry::from_response(url, response);
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
            .put(entry);
        Ok(())
    }

    async fn put_all(&self, name: &str, entries: &[(Url, Response)]) -> Result<(), AgentError> {
        let entries: Vec<CacheEntry> = entries
            .iter()
            .map(|(url, response)| CacheEntry::from_response(url, response))
            .collect();

        let mut caches = self.caches.write().await;
        let cache = caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name));
        for entry in entries {
            cache.put(entry);
        }
        Ok(())
    }

    async fn cached_urls(&self, name: &str) -> Result<Vec<String>, AgentError> {
        Ok(self
            .caches
            .read()
            .await
            .get(name)
            .map(|cache| cache.keys().into_iter().map(str::to_string).collect())
            .unwrap_or_default())
    }
}
