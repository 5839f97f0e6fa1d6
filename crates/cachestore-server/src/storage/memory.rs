//! In-memory cache using DashMap (replaces Redis for single-node runs)

use async_trait::async_trait;
use cachestore_core::{CacheStore, Profile, Result, StoreError};
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// In-memory TTL cache. Expired entries read as absent and are swept periodically.
pub struct MemoryCache {
    data: Arc<DashMap<String, CacheEntry>>,
}

struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

impl MemoryCache {
    /// Must be called inside a tokio runtime (starts the sweep task).
    pub fn new() -> Self {
        let cache = Self {
            data: Arc::new(DashMap::new()),
        };

        cache.start_cleanup_task();

        cache
    }

    /// Get a live value. Reading never extends the TTL.
    pub fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        if let Some(entry) = self.data.get(key) {
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }

        // Only drop the entry we saw expire, not one written concurrently
        self.data.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    pub fn set_with_ttl(&self, key: String, value: Vec<u8>, ttl: Duration) {
        self.data.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Delete a key from cache
    #[cfg(test)]
    pub fn delete(&self, key: &str) {
        self.data.remove(key);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.data.len()
    }

    fn start_cleanup_task(&self) {
        let data: Weak<DashMap<String, CacheEntry>> = Arc::downgrade(&self.data);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;

                // Cache dropped
                let Some(data) = data.upgrade() else {
                    break;
                };

                let now = Instant::now();
                data.retain(|_, entry| !entry.is_expired(now));
            }
        });
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn put(&self, uid: &str, profile: &Profile, ttl: Duration) -> Result<()> {
        let value = profile.to_json_bytes()?;
        self.set_with_ttl(uid.to_string(), value, ttl);
        Ok(())
    }

    async fn get(&self, uid: &str) -> Result<Option<Profile>> {
        match self.get_raw(uid) {
            Some(bytes) => Profile::from_json_bytes(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Cache(format!("undecodable entry for {}: {}", uid, e))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_operations() {
        let cache = MemoryCache::new();

        // Test set and get
        cache.set_with_ttl("key1".to_string(), vec![1, 2, 3], Duration::from_secs(60));
        assert_eq!(cache.get_raw("key1"), Some(vec![1, 2, 3]));

        // Test non-existent key
        assert_eq!(cache.get_raw("nonexistent"), None);

        // Test delete
        cache.delete("key1");
        assert_eq!(cache.get_raw("key1"), None);
    }

    #[tokio::test]
    async fn test_ttl() {
        let cache = MemoryCache::new();

        // Set with very short TTL
        cache.set_with_ttl("key1".to_string(), vec![1, 2, 3], Duration::from_millis(10));
        assert_eq!(cache.get_raw("key1"), Some(vec![1, 2, 3]));

        // Wait for expiration
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get_raw("key1"), None);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_read_does_not_extend_ttl() {
        let cache = MemoryCache::new();
        cache.set_with_ttl("key1".to_string(), vec![7], Duration::from_millis(60));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get_raw("key1"), Some(vec![7]));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get_raw("key1"), None);
    }

    #[tokio::test]
    async fn test_profile_round_trip_through_store() {
        let cache = MemoryCache::new();
        let ann = Profile::new("u1", "Ann", "ann@x.com", 30);

        cache.put("u1", &ann, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("u1").await.unwrap(), Some(ann));
        assert_eq!(cache.get("u2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_error_not_miss() {
        let cache = MemoryCache::new();
        cache.set_with_ttl("u1".to_string(), b"not json".to_vec(), Duration::from_secs(60));

        assert!(matches!(cache.get("u1").await, Err(StoreError::Cache(_))));
    }
}
