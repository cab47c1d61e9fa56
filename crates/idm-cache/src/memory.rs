//! In-process cache on a concurrent map.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::CacheResult;
use crate::provider::CacheProvider;

#[derive(Debug, Clone)]
struct CachedValue {
    value: serde_json::Value,
    expires_at: Option<Instant>,
}

impl CachedValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory [`CacheProvider`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<(String, String), CachedValue>,
    default_ttl: Option<Duration>,
}

impl MemoryCache {
    /// Creates a cache whose entries never expire.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the TTL used when a put does not specify one.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Returns the number of live entries in a namespace.
    #[must_use]
    pub fn len(&self, namespace: &str) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|e| e.key().0 == namespace && !e.value().is_expired(now))
            .count()
    }

    /// Checks whether a namespace holds no live entries.
    #[must_use]
    pub fn is_empty(&self, namespace: &str) -> bool {
        self.len(namespace) == 0
    }
}

#[async_trait]
impl CacheProvider for MemoryCache {
    async fn get_value(&self, namespace: &str, key: &str) -> CacheResult<Option<serde_json::Value>> {
        let id = (namespace.to_string(), key.to_string());
        let now = Instant::now();

        let hit = match self.entries.get(&id) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => None,
            None => return Ok(None),
        };
        if hit.is_none() {
            self.entries.remove_if(&id, |_, v| v.is_expired(now));
        }

        tracing::trace!(namespace, key, hit = hit.is_some(), "Cache lookup");
        Ok(hit)
    }

    async fn put_value(
        &self,
        namespace: &str,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let expires_at = ttl.or(self.default_ttl).map(|ttl| Instant::now() + ttl);
        self.entries.insert(
            (namespace.to_string(), key.to_string()),
            CachedValue { value, expires_at },
        );
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> CacheResult<()> {
        self.entries.remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }

    async fn invalidate(&self, namespace: &str) -> CacheResult<u64> {
        let before = self.entries.len();
        self.entries.retain(|(ns, _), _| ns != namespace);
        let dropped = before.saturating_sub(self.entries.len()) as u64;

        tracing::debug!(namespace, dropped, "Invalidated cache namespace");
        Ok(dropped)
    }

    async fn invalidate_all(&self) -> CacheResult<()> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::CacheProviderExt;

    #[tokio::test]
    async fn typed_round_trip() {
        let cache = MemoryCache::new();
        cache
            .put("store-a", "names", &vec!["alice".to_string()], None)
            .await
            .unwrap();

        let names: Option<Vec<String>> = cache.get("store-a", "names").await.unwrap();
        assert_eq!(names, Some(vec!["alice".to_string()]));

        let other: Option<Vec<String>> = cache.get("store-b", "names").await.unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn invalidate_drops_only_one_namespace() {
        let cache = MemoryCache::new();
        cache.put("a", "k1", &1_u32, None).await.unwrap();
        cache.put("a", "k2", &2_u32, None).await.unwrap();
        cache.put("b", "k1", &3_u32, None).await.unwrap();

        assert_eq!(cache.invalidate("a").await.unwrap(), 2);
        assert!(cache.is_empty("a"));
        assert_eq!(cache.len("b"), 1);

        cache.invalidate_all().await.unwrap();
        assert!(cache.is_empty("b"));
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = MemoryCache::new().with_default_ttl(Duration::from_millis(10));
        cache.put("a", "k", &"v", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let value: Option<String> = cache.get("a", "k").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn shape_mismatch_is_an_error() {
        let cache = MemoryCache::new();
        cache.put("a", "k", &"text", None).await.unwrap();
        let number: CacheResult<Option<u32>> = cache.get("a", "k").await;
        assert!(number.is_err());
    }
}
