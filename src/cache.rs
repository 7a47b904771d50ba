//! Edge response cache
//!
//! Full (`200`) GET responses are cached keyed by a normalized request:
//! method forced to GET, the request URL, and a narrow allow-list of
//! varying headers such as `Accept`. Entries are replaced wholesale on
//! write (last write wins) and expire by TTL. An optional byte budget
//! evicts least recently used entries.

use crate::error::{MediaError, Result};
use crate::models::MediaBody;
use crate::response::MediaResponse;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode, Uri};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Normalized request identity used as the cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from a request
    ///
    /// The method is always treated as GET so a HEAD can never produce a
    /// distinct entry. Only headers named in `vary` contribute, lowercased
    /// and sorted so header order does not matter.
    pub fn from_request(uri: &Uri, headers: &HeaderMap, vary: &[String]) -> Self {
        let host = headers
            .get(http::header::HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| uri.authority().map(|a| a.as_str()))
            .unwrap_or("");
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

        let mut varying: Vec<(String, String)> = vary
            .iter()
            .map(|name| name.to_ascii_lowercase())
            .filter_map(|name| {
                let value = headers.get(name.as_str())?.to_str().ok()?.to_string();
                Some((name, value))
            })
            .collect();
        varying.sort();

        let mut key = format!("GET {}{}", host, path);
        for (name, value) in varying {
            key.push('|');
            key.push_str(&name);
            key.push('=');
            key.push_str(&value);
        }
        CacheKey(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Full-response cache consulted before the object store
#[async_trait]
pub trait EdgeCache: Send + Sync {
    /// Look up a cached response
    async fn lookup(&self, key: &CacheKey) -> Result<Option<MediaResponse>>;

    /// Store a response, replacing any existing entry for `key`
    async fn store(&self, key: &CacheKey, response: MediaResponse) -> Result<()>;
}

/// Cached response with expiration and access tracking
struct CacheEntry {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    expires_at: SystemTime,
    last_accessed: SystemTime,
}

impl CacheEntry {
    fn size(&self) -> usize {
        self.body.len()
    }

    fn to_response(&self) -> MediaResponse {
        MediaResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone().into(),
        }
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_bytes: usize,
    pub hits: u64,
    pub misses: u64,
}

/// In-process edge cache with TTL expiry and LRU eviction
pub struct MemoryEdgeCache {
    storage: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
    ttl: Duration,
    max_size_bytes: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryEdgeCache {
    /// Create a new cache with the given time-to-live
    pub fn new(ttl: Duration) -> Self {
        MemoryEdgeCache {
            storage: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            max_size_bytes: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a new cache bounded to `max_size_bytes` of response bodies
    pub fn with_max_size(ttl: Duration, max_size_bytes: usize) -> Self {
        MemoryEdgeCache {
            max_size_bytes: Some(max_size_bytes),
            ..Self::new(ttl)
        }
    }

    /// Get cache statistics
    pub fn get_stats(&self) -> CacheStats {
        let (total_entries, total_bytes) = match self.storage.read() {
            Ok(storage) => (storage.len(), storage.values().map(CacheEntry::size).sum()),
            Err(_) => (0, 0),
        };
        CacheStats {
            total_entries,
            total_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Evict least recently used entries until `needed_bytes` fit the budget
    fn evict_lru(storage: &mut HashMap<CacheKey, CacheEntry>, max_size: usize, needed_bytes: usize) {
        let mut current: usize = storage.values().map(CacheEntry::size).sum();
        if current + needed_bytes <= max_size {
            return;
        }

        let mut entries: Vec<_> = storage
            .iter()
            .map(|(k, v)| (k.clone(), v.last_accessed, v.size()))
            .collect();
        entries.sort_by_key(|(_, last_accessed, _)| *last_accessed);

        let mut evicted = 0;
        for (key, _, size) in entries {
            if current + needed_bytes <= max_size {
                break;
            }
            storage.remove(&key);
            current = current.saturating_sub(size);
            evicted += 1;
        }

        debug!("LRU eviction: removed {} entries, {} bytes remain", evicted, current);
    }

    fn poisoned(e: impl fmt::Display) -> MediaError {
        MediaError::upstream(format!("edge cache lock poisoned: {}", e))
    }
}

#[async_trait]
impl EdgeCache for MemoryEdgeCache {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<MediaResponse>> {
        let now = SystemTime::now();
        let mut storage = self.storage.write().map_err(Self::poisoned)?;

        let result = match storage.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.last_accessed = now;
                Some(entry.to_response())
            }
            Some(_) => {
                debug!("Cache entry expired: key={}", key);
                storage.remove(key);
                None
            }
            None => None,
        };

        if result.is_some() {
            debug!("Cache hit: key={}", key);
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            debug!("Cache miss: key={}", key);
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        Ok(result)
    }

    async fn store(&self, key: &CacheKey, response: MediaResponse) -> Result<()> {
        if response.status != StatusCode::OK {
            warn!(
                "Refusing to cache non-200 response: key={}, status={}",
                key, response.status
            );
            return Ok(());
        }

        let MediaResponse { status, headers, body } = response;
        let MediaBody::Bytes(body) = body else {
            debug!("Refusing to cache streamed response: key={}", key);
            return Ok(());
        };

        let now = SystemTime::now();
        let size = body.len();
        let mut storage = self.storage.write().map_err(Self::poisoned)?;

        // Replace first so the old entry's bytes don't count against the budget
        storage.remove(key);

        if let Some(max_size) = self.max_size_bytes {
            if size > max_size {
                debug!("Response too large to cache: key={}, size={}", key, size);
                return Ok(());
            }
            Self::evict_lru(&mut storage, max_size, size);
        }

        storage.insert(
            key.clone(),
            CacheEntry {
                status,
                headers,
                body,
                expires_at: now + self.ttl,
                last_accessed: now,
            },
        );
        debug!("Stored response in cache: key={}, size={}", key, size);

        // Periodically clean up expired entries
        if storage.len() % 100 == 0 {
            storage.retain(|_, entry| entry.expires_at > now);
        }

        Ok(())
    }
}
