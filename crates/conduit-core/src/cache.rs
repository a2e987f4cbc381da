//! In-memory TTL cache for successful GET responses.
//!
//! Entries are keyed by [`cache_key`], which serializes the method, the
//! normalized path and the query parameters in a stable order. Only the API
//! client writes here, and only for 2xx GET responses. Mutations remove a
//! whole resource family with [`ResponseCache::invalidate_resource`].
//!
//! Expired entries stay in memory until [`ResponseCache::sweep`] runs. They
//! are never returned by [`ResponseCache::get`], but remain visible to
//! [`ResponseCache::get_stale`] for callers that explicitly opted into the
//! stale fallback.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::http_client::{HttpMethod, HttpResponse};

/// Response headers kept with a cached body so it can be replayed.
const REPLAY_HEADERS: [&str; 3] = ["content-type", "etag", "last-modified"];

/// Defines how a single API call interacts with the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Read from the cache if a non-expired entry is present;
    /// otherwise, fetch from the network and write the response to the cache. (Default)
    #[default]
    Use,
    /// Always fetch from the network, bypassing any cached entry,
    /// and write the new response to the cache.
    Refresh,
    /// Always fetch from the network and do not read from or write to the cache.
    Bypass,
}

impl CacheMode {
    pub const fn reads(self) -> bool {
        matches!(self, Self::Use)
    }

    pub const fn writes(self) -> bool {
        matches!(self, Self::Use | Self::Refresh)
    }
}

/// Build a deterministic cache key.
///
/// Parameters are URL-encoded and sorted by name then value, so
/// `?b=2&a=1` and `?a=1&b=2` produce the same key.
pub fn cache_key(method: HttpMethod, path: &str, params: &[(String, String)]) -> String {
    let mut key = format!("{} {}", method.as_str(), normalize_path(path));
    if params.is_empty() {
        return key;
    }

    let mut pairs = params
        .iter()
        .map(|(name, value)| (urlencoding::encode(name), urlencoding::encode(value)))
        .collect::<Vec<_>>();
    pairs.sort();

    key.push('?');
    let query = pairs
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    key.push_str(&query);
    key
}

/// Path with a single leading slash and no trailing slash.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    format!("/{trimmed}")
}

/// A cached 2xx response body plus the headers needed for replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl CachedResponse {
    pub fn from_response(response: &HttpResponse) -> Self {
        let headers = REPLAY_HEADERS
            .iter()
            .filter_map(|name| {
                response
                    .header(name)
                    .map(|value| ((*name).to_owned(), value.to_owned()))
            })
            .collect();

        Self {
            status: response.status,
            headers,
            body: response.body.clone(),
        }
    }
}

/// Counters reported by [`ResponseCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub invalidations: u64,
    pub evictions: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: CachedResponse,
    resource: String,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) < self.ttl
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

impl CacheInner {
    fn remove_where(&mut self, predicate: impl Fn(&str, &CacheEntry) -> bool) -> usize {
        let before = self.map.len();
        self.map.retain(|key, entry| !predicate(key, entry));
        before - self.map.len()
    }
}

/// Thread-safe in-memory response cache shared by the whole process.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    inner: Arc<Mutex<CacheInner>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached response if one exists and hasn't expired.
    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let hit = inner
            .map
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.response.clone());

        if hit.is_some() {
            inner.stats.hits += 1;
        } else {
            inner.stats.misses += 1;
        }
        hit
    }

    /// Get an entry regardless of expiry, as long as it has not been swept.
    pub fn get_stale(&self, key: &str) -> Option<CachedResponse> {
        self.inner
            .lock()
            .map
            .get(key)
            .map(|entry| entry.response.clone())
    }

    /// Store a response for `ttl`. A zero TTL means "never cache" and is a no-op.
    pub fn set(&self, key: String, resource: &str, response: CachedResponse, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }

        let mut inner = self.inner.lock();
        inner.map.insert(
            key,
            CacheEntry {
                response,
                resource: resource.to_owned(),
                inserted_at: Instant::now(),
                ttl,
            },
        );
        inner.stats.stores += 1;
    }

    /// Remove every entry whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.remove_where(|key, _| key.starts_with(prefix));
        inner.stats.invalidations += removed as u64;
        removed
    }

    /// Remove every entry cached for `resource`, including item reads
    /// (`/portfolio/7`) and filtered lists (`/portfolio?page=2`).
    pub fn invalidate_resource(&self, resource: &str) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.remove_where(|_, entry| entry.resource == resource);
        inner.stats.invalidations += removed as u64;
        if removed > 0 {
            debug!(resource, removed, "invalidated cached responses");
        }
        removed
    }

    /// Remove all expired entries.
    pub fn sweep(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let removed = inner.remove_where(|_, entry| !entry.is_fresh(now));
        inner.stats.evictions += removed as u64;
        removed
    }

    /// Number of entries, including expired entries not yet swept.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.map.len(),
            ..inner.stats
        }
    }

    /// Run [`sweep`](Self::sweep) every `every` on the current tokio runtime.
    ///
    /// The hosting process owns the returned handle and aborts it on shutdown.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.sweep();
                debug!(removed, remaining = cache.len(), "cache sweep finished");
            }
        })
    }
}
