//! Key-value cache seam shared by access-token memoization and quota counters.
//!
//! The cache is externally owned and may be hit by concurrent callers. No
//! ordering or atomicity is promised across keys.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache value could not be decoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> CacheResult<()>;
}

pub type SharedCache = Arc<dyn KeyValueCache>;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

/// Process-local cache backed by a concurrent map.
///
/// With a TTL, each write restarts the entry's lifetime, which gives the
/// rolling-window behaviour the quota counters rely on.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, Entry>,
    ttl: Option<Duration>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Some(ttl),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueCache for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let expired = match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) => match entry.expires_at {
                Some(deadline) if Instant::now() >= deadline => true,
                _ => return Ok(Some(entry.value.clone())),
            },
        };

        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value) -> CacheResult<()> {
        let expires_at = self.ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn get_returns_what_was_set() {
        let cache = InMemoryCache::new();
        cache.set("a", json!(3)).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap(), Some(json!(3)));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::with_ttl(Duration::from_secs(60));
        cache.set("rpm", json!(1)).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("rpm").await.unwrap(), Some(json!(1)));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("rpm").await.unwrap(), None);
        assert!(cache.is_empty());
    }
}
