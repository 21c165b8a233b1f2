//! Key-value stores backing the collection cache.
//!
//! ```text
//! CacheProvider (enum)
//!   ├── Redis(RedisStore)    <- GET/SETEX over a shared ConnectionManager
//!   └── Memory(MemoryStore)  <- in-process moka cache, bounded, per-entry TTL
//! ```

use std::future::Future;
use std::time::{Duration, Instant};

use moka::Expiry;

#[cfg(feature = "redis")]
use crate::redis_store::RedisStore;

/// Entry count of the in-process store unless configured otherwise.
pub const DEFAULT_MEMORY_CAPACITY: u64 = 10_000;

/// Longest TTL a store entry can carry; longer TTLs are clamped to it.
pub const MAX_ENTRY_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Errors raised by a cache store.
///
/// These never leave the proxy: callers log them and serve from the origin.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The store could not be reached.
    #[error("cache connection error: {0}")]
    Connection(String),
    /// The store answered with an error.
    #[error("cache backend error: {0}")]
    Backend(String),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Fallible remote key-value store with per-entry TTL.
pub trait CacheStore: Send + Sync {
    /// Returns `Ok(Some(value))` on hit, `Ok(None)` on miss.
    fn get(&self, key: &str) -> impl Future<Output = CacheResult<Option<String>>> + Send;

    /// Stores `value` under `key`, expiring after `ttl`.
    fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = CacheResult<()>> + Send;

    fn provider_name(&self) -> &'static str;
}

#[derive(Clone, Debug)]
struct MemoryEntry {
    value: String,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with.
struct EntryTtl;

impl Expiry<String, MemoryEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &MemoryEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &MemoryEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process store on a bounded `moka` cache; clones share the same
/// entries.
///
/// Expired entries are dropped by moka's housekeeping, and the least
/// valuable entries are evicted once `max_capacity` is reached.
#[derive(Clone)]
pub struct MemoryStore {
    entries: moka::future::Cache<String, MemoryEntry>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("max_capacity", &self.entries.policy().max_capacity())
            .field("entry_count", &self.entries.entry_count())
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_capacity: u64) -> Self {
        let entries = moka::future::Cache::builder()
            .max_capacity(max_capacity.max(1))
            .expire_after(EntryTtl)
            .build();
        tracing::debug!(max_capacity, "in-process cache created");
        Self { entries }
    }

    /// Number of live entries, after pending expirations and evictions
    /// have been applied.
    pub async fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }
}

impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.entries.get(key).await.map(|entry| entry.value))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let entry = MemoryEntry {
            value: value.to_owned(),
            ttl: ttl.min(MAX_ENTRY_TTL),
        };
        self.entries.insert(key.to_owned(), entry).await;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

/// Store selected at startup.
#[derive(Clone, Debug)]
pub enum CacheProvider {
    #[cfg(feature = "redis")]
    Redis(RedisStore),
    Memory(MemoryStore),
}

impl CacheProvider {
    /// Connects to Redis when `redis_url` is given, falling back to an
    /// in-process store when the connection fails. Startup never fails
    /// because of the cache.
    pub async fn connect_graceful(redis_url: Option<&str>, memory_capacity: u64) -> Self {
        let Some(url) = redis_url.map(str::trim).filter(|url| !url.is_empty()) else {
            tracing::info!("no redis url configured, using in-process cache");
            return Self::Memory(MemoryStore::with_capacity(memory_capacity));
        };

        #[cfg(feature = "redis")]
        {
            match RedisStore::connect(url).await {
                Ok(store) => Self::Redis(store),
                Err(err) => {
                    tracing::warn!(error = %err, "redis unavailable, using in-process cache");
                    Self::Memory(MemoryStore::with_capacity(memory_capacity))
                }
            }
        }

        #[cfg(not(feature = "redis"))]
        {
            let _ = url;
            tracing::warn!("redis url configured but the `redis` feature is disabled, using in-process cache");
            Self::Memory(MemoryStore::with_capacity(memory_capacity))
        }
    }
}

impl CacheStore for CacheProvider {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self {
            #[cfg(feature = "redis")]
            Self::Redis(store) => store.get(key).await,
            Self::Memory(store) => store.get(key).await,
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        match self {
            #[cfg(feature = "redis")]
            Self::Redis(store) => store.set_with_ttl(key, value, ttl).await,
            Self::Memory(store) => store.set_with_ttl(key, value, ttl).await,
        }
    }

    fn provider_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "redis")]
            Self::Redis(store) => store.provider_name(),
            Self::Memory(store) => store.provider_name(),
        }
    }
}
