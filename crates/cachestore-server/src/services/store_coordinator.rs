//! Cache-aside coordination between the durable store and the cache
//!
//! Writes go to the database first and are then copied into the cache.
//! Reads try the cache, fall back to the database on a miss, and backfill the
//! cache with what they found. The cache is never authoritative: every cache
//! failure degrades to the database path, every database failure is returned.

use cachestore_core::{CacheStore, DurableStore, Profile, Result, StoreError};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on a single call into each tier
#[derive(Debug, Clone, Copy)]
pub struct StoreTimeouts {
    pub durable: Duration,
    pub cache: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Persisted and cached
    Stored,
    /// Persisted, but the cache write failed
    CacheDegraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Durable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieved {
    Found { profile: Profile, source: Source },
    NotFound,
}

#[derive(Debug, Default)]
struct CoordinatorStats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_errors: AtomicU64,
    backfills: AtomicU64,
    backfill_failures: AtomicU64,
    degraded_inserts: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Cache failures and timeouts, counted apart from genuine misses
    pub cache_errors: u64,
    pub backfills: u64,
    pub backfill_failures: u64,
    pub degraded_inserts: u64,
}

pub struct StoreCoordinator {
    db: Arc<dyn DurableStore>,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
    timeouts: StoreTimeouts,
    stats: CoordinatorStats,
}

impl StoreCoordinator {
    pub fn new(
        db: Arc<dyn DurableStore>,
        cache: Arc<dyn CacheStore>,
        ttl: Duration,
        timeouts: StoreTimeouts,
    ) -> Self {
        Self {
            db,
            cache,
            ttl,
            timeouts,
            stats: CoordinatorStats::default(),
        }
    }

    /// Persist `profile`, then cache it.
    ///
    /// Nothing is cached unless the database write succeeded. A failed cache
    /// write still returns `Ok`, as [`InsertOutcome::CacheDegraded`].
    pub async fn insert(&self, profile: &Profile) -> Result<InsertOutcome> {
        profile.validate()?;

        info!("Inserting profile: uid={}", profile.uid);
        self.durable(self.db.insert(profile)).await?;

        match self
            .cached(self.cache.put(&profile.uid, profile, self.ttl))
            .await
        {
            Ok(()) => {
                debug!("Cached profile {} for {:?}", profile.uid, self.ttl);
                Ok(InsertOutcome::Stored)
            }
            Err(e) => {
                warn!(
                    "Profile {} persisted but not cached (degraded): {}",
                    profile.uid, e
                );
                self.stats.degraded_inserts.fetch_add(1, Ordering::Relaxed);
                Ok(InsertOutcome::CacheDegraded)
            }
        }
    }

    /// Look `uid` up in the cache, then in the database.
    pub async fn retrieve(&self, uid: &str) -> Result<Retrieved> {
        match self.cached(self.cache.get(uid)).await {
            Ok(Some(profile)) if profile.uid == uid => {
                debug!("Cache hit for {}", uid);
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Retrieved::Found {
                    profile,
                    source: Source::Cache,
                });
            }
            Ok(Some(profile)) => {
                warn!(
                    "Cache entry for {} holds profile {}, ignoring it",
                    uid, profile.uid
                );
                self.stats.cache_errors.fetch_add(1, Ordering::Relaxed);
            }
            Ok(None) => {
                debug!("Cache miss for {}, searching database", uid);
                self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("Cache lookup failed for {}, searching database: {}", uid, e);
                self.stats.cache_errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        let Some(profile) = self.durable(self.db.lookup(uid)).await? else {
            debug!("Profile {} not found in database", uid);
            return Ok(Retrieved::NotFound);
        };

        match self.cached(self.cache.put(uid, &profile, self.ttl)).await {
            Ok(()) => {
                self.stats.backfills.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("Failed to backfill cache for {}: {}", uid, e);
                self.stats.backfill_failures.fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(Retrieved::Found {
            profile,
            source: Source::Durable,
        })
    }

    pub fn stats(&self) -> StatsSnapshot {
        let stats = &self.stats;
        StatsSnapshot {
            cache_hits: stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: stats.cache_misses.load(Ordering::Relaxed),
            cache_errors: stats.cache_errors.load(Ordering::Relaxed),
            backfills: stats.backfills.load(Ordering::Relaxed),
            backfill_failures: stats.backfill_failures.load(Ordering::Relaxed),
            degraded_inserts: stats.degraded_inserts.load(Ordering::Relaxed),
        }
    }

    async fn durable<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        with_timeout("durable", self.timeouts.durable, op).await
    }

    async fn cached<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        with_timeout("cache", self.timeouts.cache, op).await
    }
}

async fn with_timeout<T>(
    tier: &'static str,
    limit: Duration,
    op: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, op)
        .await
        .unwrap_or_else(|_| {
            Err(StoreError::Timeout {
                tier,
                elapsed: limit,
            })
        })
}
