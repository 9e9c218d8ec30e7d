//! Per-instance keyed cache with per-entry time-to-live.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

pub const DEFAULT_CAPACITY: usize = 100;

/// Cache keys are the calling method plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: &'static str,
    pub args: Vec<String>,
}

impl CacheKey {
    pub fn new(method: &'static str) -> Self {
        Self {
            method,
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(method: &'static str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

struct CacheEntry {
    value: Box<dyn Any + Send>,
    expires_at: Instant,
}

/// A bounded cache where every entry carries its own expiry.
///
/// Values are type-erased so one cache can hold results of differently-typed
/// calls, keyed per method. Expired entries are treated as absent; on
/// overflow the entry with the nearest expiry is evicted. Instances are
/// private to their owner, never shared.
pub struct TtlCache {
    capacity: usize,
    entries: HashMap<CacheKey, CacheEntry>,
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
        }
    }

    pub fn get<T: Clone + 'static>(&self, key: &CacheKey) -> Option<T> {
        let entry = self.entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    pub fn put<T: Send + 'static>(&mut self, key: CacheKey, value: T, ttl: Duration) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.evict_nearest_expiry();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value: Box::new(value),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn evict_nearest_expiry(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.expires_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Owners of a [`TtlCache`] that cached call sites can reach.
pub trait CacheHost {
    fn get_cache(&mut self, cache_hint: Option<&str>) -> &mut TtlCache;
}

/// Look up `key`; on a miss, await `fetch`, store its value for `ttl` and
/// return it. Concurrent misses are not coalesced.
pub async fn cached<T, E, Fut>(
    cache: &mut TtlCache,
    key: CacheKey,
    ttl: Duration,
    fetch: Fut,
) -> std::result::Result<T, E>
where
    T: Clone + Send + 'static,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    if let Some(value) = cache.get::<T>(&key) {
        return Ok(value);
    }
    let value = fetch.await?;
    cache.put(key, value.clone(), ttl);
    Ok(value)
}
