//! Storage traits for the two tiers

use crate::Result;
use async_trait::async_trait;
use cachestore_types::Profile;
use std::time::Duration;

/// Authoritative, persistent profile store
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Create the backing database and table if absent. Idempotent.
    async fn ensure_schema(&self) -> Result<()>;

    /// Persist a new profile. An existing `uid` is an error, never overwritten.
    async fn insert(&self, profile: &Profile) -> Result<()>;

    /// `Ok(None)` when no row matches. More than one row is an integrity error.
    async fn lookup(&self, uid: &str) -> Result<Option<Profile>>;
}

/// Volatile, non-authoritative profile cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Store `profile` under `uid`, expiring after `ttl`.
    async fn put(&self, uid: &str, profile: &Profile, ttl: Duration) -> Result<()>;

    /// `Ok(None)` for both absent and expired keys. Reads do not extend the TTL.
    async fn get(&self, uid: &str) -> Result<Option<Profile>>;
}
