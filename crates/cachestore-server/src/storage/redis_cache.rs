//! Redis cache store

use crate::config::RedisConfig;
use async_trait::async_trait;
use cachestore_core::{CacheStore, Profile, Result, StoreError};
use redis::aio::ConnectionManager;
use redis::{Client, IntoConnectionInfo};
use std::time::Duration;
use tokio::sync::{OnceCell, Semaphore};

/// One Redis server, connected lazily. A failed connect is retried on the
/// next call.
struct Endpoint {
    client: Client,
    conn: OnceCell<ConnectionManager>,
    address: String,
}

impl Endpoint {
    fn open(host: &str, port: u16, password: Option<&String>) -> Result<Self> {
        let mut info = (host, port).into_connection_info().map_err(cache_error)?;
        info.redis.password = password.filter(|p| !p.is_empty()).cloned();

        Ok(Self {
            client: Client::open(info).map_err(cache_error)?,
            conn: OnceCell::new(),
            address: format!("{}:{}", host, port),
        })
    }

    async fn connection(&self, timeout: Duration) -> Result<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                tracing::info!("Connecting to Redis at {}...", self.address);
                let conn = tokio::time::timeout(timeout, ConnectionManager::new(self.client.clone()))
                    .await
                    .map_err(|_| StoreError::Timeout {
                        tier: "cache",
                        elapsed: timeout,
                    })?
                    .map_err(cache_error)?;
                tracing::info!("Connected to Redis at {}", self.address);
                Ok::<_, StoreError>(conn)
            })
            .await?;

        // ConnectionManager is a cheap handle onto one multiplexed connection
        Ok(conn.clone())
    }
}

/// Redis-backed cache. Connects lazily so the service can start while the
/// cache tier is down. Reads go to `reader_host` when one is configured,
/// writes always go to the primary.
pub struct RedisCache {
    primary: Endpoint,
    reader: Option<Endpoint>,
    permits: Semaphore,
    conn_timeout: Duration,
}

impl RedisCache {
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let password = config.password.as_ref();
        let primary = Endpoint::open(&config.host, config.port, password)?;

        let reader = match config.reader_host.as_deref().filter(|h| !h.is_empty()) {
            Some(host) => {
                let port = config.reader_port.unwrap_or(config.port);
                Some(Endpoint::open(host, port, password)?)
            }
            None => None,
        };

        Ok(Self {
            primary,
            reader,
            permits: Semaphore::new(config.pool_max_active),
            conn_timeout: config.conn_timeout(),
        })
    }

    fn read_endpoint(&self) -> &Endpoint {
        self.reader.as_ref().unwrap_or(&self.primary)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn put(&self, uid: &str, profile: &Profile, ttl: Duration) -> Result<()> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| StoreError::Cache("cache client is shut down".to_string()))?;
        let mut conn = self.primary.connection(self.conn_timeout).await?;

        let value = profile.to_json_bytes()?;
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        redis::cmd("SET")
            .arg(uid)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(cache_error)
    }

    async fn get(&self, uid: &str) -> Result<Option<Profile>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| StoreError::Cache("cache client is shut down".to_string()))?;
        let mut conn = self.read_endpoint().connection(self.conn_timeout).await?;

        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(uid)
            .query_async(&mut conn)
            .await
            .map_err(cache_error)?;

        match value {
            Some(bytes) => Profile::from_json_bytes(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Cache(format!("undecodable entry for {}: {}", uid, e))),
            None => Ok(None),
        }
    }
}

fn cache_error(e: redis::RedisError) -> StoreError {
    StoreError::Cache(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn unreachable_config() -> RedisConfig {
        RedisConfig {
            host: "127.0.0.1".to_string(),
            // Nothing listens on port 1
            port: 1,
            conn_timeout_ms: 300,
            ..RedisConfig::default()
        }
    }

    #[test]
    fn test_new_does_not_connect() {
        assert_ok!(RedisCache::new(&unreachable_config()));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_error_not_miss() {
        let cache = RedisCache::new(&unreachable_config()).unwrap();

        assert_err!(cache.get("u1").await);

        let ann = Profile::new("u1", "Ann", "ann@x.com", 30);
        assert_err!(cache.put("u1", &ann, Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn test_failed_connect_is_retried() {
        let cache = RedisCache::new(&unreachable_config()).unwrap();

        assert_err!(cache.get("u1").await);
        assert!(!cache.primary.conn.initialized());
        assert_err!(cache.get("u1").await);
    }

    #[test]
    fn test_reads_use_reader_host_when_set() {
        let cache = RedisCache::new(&RedisConfig {
            reader_host: Some("10.0.0.2".to_string()),
            ..unreachable_config()
        })
        .unwrap();
        assert_eq!(cache.primary.address, "127.0.0.1:1");
        assert_eq!(cache.read_endpoint().address, "10.0.0.2:1");

        let cache = RedisCache::new(&RedisConfig {
            reader_host: Some(String::new()),
            ..unreachable_config()
        })
        .unwrap();
        assert!(cache.reader.is_none());
        assert_eq!(cache.read_endpoint().address, "127.0.0.1:1");
    }

    #[tokio::test]
    async fn test_unreachable_reader_does_not_touch_primary() {
        let cache = RedisCache::new(&RedisConfig {
            reader_host: Some("127.0.0.1".to_string()),
            reader_port: Some(1),
            ..unreachable_config()
        })
        .unwrap();

        assert_err!(cache.get("u1").await);
        assert!(!cache.reader.as_ref().unwrap().conn.initialized());
        assert!(!cache.primary.conn.initialized());
    }

    /// Needs a Redis server on 127.0.0.1:6379
    fn local_config() -> RedisConfig {
        RedisConfig {
            host: "127.0.0.1".to_string(),
            port: 6379,
            ..RedisConfig::default()
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_local_redis_put_get_and_expiry() {
        let cache = RedisCache::new(&local_config()).unwrap();
        let uid = format!("cachestore-test-{}", std::process::id());
        let ann = Profile::new(&uid, "Ann", "ann@x.com", 30);

        assert_ok!(cache.put(&uid, &ann, Duration::from_millis(300)).await);
        assert_eq!(cache.get(&uid).await.unwrap(), Some(ann));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(cache.get(&uid).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore]
    async fn test_local_redis_unreachable_reader_keeps_writes_on_primary() {
        let cache = RedisCache::new(&RedisConfig {
            reader_host: Some("127.0.0.1".to_string()),
            reader_port: Some(1),
            conn_timeout_ms: 300,
            ..local_config()
        })
        .unwrap();
        let uid = format!("cachestore-reader-{}", std::process::id());
        let ann = Profile::new(&uid, "Ann", "ann@x.com", 30);

        assert_ok!(cache.put(&uid, &ann, Duration::from_secs(5)).await);
        assert!(cache.primary.conn.initialized());
        assert_err!(cache.get(&uid).await);

        let primary_only = RedisCache::new(&local_config()).unwrap();
        assert_eq!(primary_only.get(&uid).await.unwrap(), Some(ann));
    }
}
