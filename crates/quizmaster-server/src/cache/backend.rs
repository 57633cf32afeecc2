//! Cache store backends: in-process DashMap and Redis.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use thiserror::Error;

/// Errors from the cache store.
///
/// Callers treat every variant the same way: log it and degrade to a miss or
/// no-op. Nothing here ever reaches a client.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache backend error: {0}")]
    Backend(String),
}

/// A cached entry with TTL support.
///
/// The data is wrapped in `Arc` to allow cheap cloning on cache hits.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            cached_at: Instant::now(),
            ttl,
        }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Capability interface over a cache backend.
///
/// `supports_pattern_scan` declares whether `delete_matching` can enumerate
/// keys; middleware only ever calls the polymorphic methods and never
/// inspects the backend.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Delete every key whose name contains `pattern`; returns how many went.
    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;

    fn supports_pattern_scan(&self) -> bool;
}

/// Type alias for a shareable cache store instance.
pub type CacheHandle = Arc<dyn CacheStore>;

/// Single-instance in-process cache.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CachedEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.data.as_ref().clone())),
            Some(entry) => {
                // Expired: drop it on the way out.
                drop(entry);
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_string(), CachedEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    /// The map has no scan capability, so pattern deletion degrades to a
    /// full clear. Blunt, but it can never leave a stale matching entry
    /// behind; deployments that need subset invalidation run Redis.
    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        let dropped = self.entries.len() as u64;
        tracing::debug!(pattern = %pattern, dropped, "no scan capability, clearing entire cache");
        self.entries.clear();
        Ok(dropped)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries.clear();
        Ok(())
    }

    fn supports_pattern_scan(&self) -> bool {
        false
    }
}

/// Redis-backed cache for multi-instance deployments.
///
/// Every key is namespaced with a store-level prefix so unrelated keys in a
/// shared Redis never match a pattern scan.
pub struct RedisCache {
    pool: Pool,
    namespace: String,
}

impl RedisCache {
    pub fn new(pool: Pool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{key}", self.namespace)
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }

    /// Collect every key matching the glob before deleting any of them.
    ///
    /// The cursor loop runs until SCAN returns to 0. Keys written between
    /// scan start and the final DEL are not guaranteed removed; that race is
    /// bounded by the entry TTL and accepted.
    async fn scan_keys(
        &self,
        conn: &mut deadpool_redis::Connection,
        glob: &str,
    ) -> Result<Vec<String>, CacheError> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, mut batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(glob)
                .arg("COUNT")
                .arg(100)
                .query_async(conn)
                .await
                .map_err(|e| CacheError::Backend(format!("SCAN: {e}")))?;
            keys.append(&mut batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection().await?;
        conn.get(self.namespaced(key))
            .await
            .map_err(|e| CacheError::Backend(format!("GET: {e}")))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.set_ex(self.namespaced(key), value, ttl.as_secs())
            .await
            .map_err(|e| CacheError::Backend(format!("SETEX: {e}")))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.del(self.namespaced(key))
            .await
            .map_err(|e| CacheError::Backend(format!("DEL: {e}")))
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut conn = self.connection().await?;
        let glob = format!("{}*{pattern}*", self.namespace);
        let keys = self.scan_keys(&mut conn, &glob).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let deleted = keys.len() as u64;
        for chunk in keys.chunks(500) {
            conn.del::<_, ()>(chunk)
                .await
                .map_err(|e| CacheError::Backend(format!("DEL: {e}")))?;
        }
        Ok(deleted)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        // Only this namespace, never the whole database.
        self.delete_matching("").await.map(|_| ())
    }

    fn supports_pattern_scan(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let cache = MemoryCache::new();
        cache
            .set("k", b"payload".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"payload".to_vec()));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let cache = MemoryCache::new();
        cache
            .set("k", b"payload".to_vec(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        // The expired entry was removed on read.
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_a_single_key() {
        let cache = MemoryCache::new();
        cache
            .set("a", b"1".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set("b", b"2".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        cache.delete("a").await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert!(cache.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn memory_pattern_delete_clears_everything() {
        let cache = MemoryCache::new();
        cache
            .set("views_subjects", b"1".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set("views_quizzes", b"2".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        let dropped = cache.delete_matching("subjects").await.unwrap();
        assert_eq!(dropped, 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn memory_cache_declares_no_scan_capability() {
        assert!(!MemoryCache::new().supports_pattern_scan());
    }
}
