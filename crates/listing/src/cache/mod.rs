//! Facet value cache with Moka (L1) and optional Redis (L2).
//!
//! Stores are injected as a `CacheStore` capability so a request can run
//! against an in-process store, a shared Redis store, or both. An unreachable
//! store is a cache miss. Concurrent requests may recompute the same missing
//! entry; recomputation is a pure read, so the last write simply wins.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use parking_lot::Mutex;
use redis::Commands;
use tracing::{debug, warn};

use crate::config::ListingConfig;
use crate::error::ListingResult;
use crate::facet::FacetValueSet;

/// Upper bound on how long the L1 tier of a tiered store keeps an entry.
const L1_TTL_SECS: u64 = 60;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Key/value store capability backing the facet value cache.
///
/// No delete: entries are left to expire.
pub trait CacheStore: Send + Sync {
    /// Get a value; None on miss or store failure.
    fn get(&self, key: &str) -> Option<String>;

    /// Set a value with a time to live.
    fn set(&self, key: &str, value: &str, ttl: Duration);
}

#[derive(Clone)]
struct StoredEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Bounded in-process store.
///
/// Expiry is judged against the injected clock so ttl behaviour is
/// deterministic under a manual clock.
pub struct MemoryStore {
    local: Cache<String, StoredEntry>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create a store holding at most `capacity` entries.
    pub fn new(capacity: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            local: Cache::builder().max_capacity(capacity).build(),
            clock,
        }
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let entry = self.local.get(key)?;
        if self.clock.now() < entry.expires_at {
            debug!(key = %key, "cache L1 hit");
            Some(entry.value)
        } else {
            self.local.invalidate(key);
            debug!(key = %key, "cache L1 entry expired");
            None
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.local.insert(
            key.to_string(),
            StoredEntry {
                value: value.to_string(),
                expires_at,
            },
        );
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.local.entry_count())
            .finish()
    }
}

/// Shared store backed by Redis.
///
/// Connection and command failures are logged and treated as misses or
/// dropped writes; the connection is re-established on the next call.
pub struct RedisStore {
    client: redis::Client,
    conn: Mutex<Option<redis::Connection>>,
}

impl RedisStore {
    /// Create a store for a Redis URL. Does not connect yet.
    pub fn open(url: &str) -> ListingResult<Self> {
        Ok(Self::new(redis::Client::open(url)?))
    }

    /// Create a store from a client.
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            conn: Mutex::new(None),
        }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> ListingResult<T> {
        let mut guard = self.conn.lock();
        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => self.client.get_connection()?,
        };
        // A failed command leaves the connection dropped.
        let value = op(&mut conn)?;
        *guard = Some(conn);
        Ok(value)
    }
}

impl CacheStore for RedisStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.with_connection(|conn| conn.get::<_, Option<String>>(key)) {
            Ok(value) => {
                if value.is_some() {
                    debug!(key = %key, "cache L2 hit");
                }
                value
            }
            Err(e) => {
                warn!(error = %e, key = %key, "failed to read cache value from Redis");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) {
        let secs = ttl.as_secs().max(1);
        if let Err(e) = self.with_connection(|conn| conn.set_ex::<_, _, ()>(key, value, secs)) {
            warn!(error = %e, key = %key, "failed to set cache value in Redis");
            return;
        }
        debug!(key = %key, ttl = %secs, "cache L2 set");
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish()
    }
}

/// Two-tier store.
///
/// L1 (memory): in-process, short ttl, per-instance.
/// L2 (shared): shared across instances, full ttl.
pub struct TieredStore {
    local: MemoryStore,
    shared: Box<dyn CacheStore>,
}

impl TieredStore {
    pub fn new(local: MemoryStore, shared: Box<dyn CacheStore>) -> Self {
        Self { local, shared }
    }

    fn l1_ttl(ttl: Duration) -> Duration {
        ttl.min(Duration::from_secs(L1_TTL_SECS))
    }
}

impl CacheStore for TieredStore {
    fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.local.get(key) {
            return Some(value);
        }
        let value = self.shared.get(key)?;
        debug!(key = %key, "populating L1 from L2");
        self.local.set(key, &value, Duration::from_secs(L1_TTL_SECS));
        Some(value)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) {
        self.local.set(key, value, Self::l1_ttl(ttl));
        self.shared.set(key, value, ttl);
    }
}

impl std::fmt::Debug for TieredStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredStore")
            .field("local", &self.local)
            .finish()
    }
}

/// Typed facet value cache over a `CacheStore`.
///
/// A value set is never served once its own `cached_at + ttl` has passed,
/// even if the store still returns it.
#[derive(Clone)]
pub struct ValueCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl ValueCache {
    /// Create a cache over a store.
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    /// Build the store stack described by the configuration.
    pub fn from_config(config: &ListingConfig, clock: Arc<dyn Clock>) -> ListingResult<Self> {
        let local = MemoryStore::new(config.cache_capacity, clock.clone());
        let store: Arc<dyn CacheStore> = match &config.redis_url {
            Some(url) => Arc::new(TieredStore::new(local, Box::new(RedisStore::open(url)?))),
            None => Arc::new(local),
        };
        Ok(Self::new(store, clock, config.cache_ttl))
    }

    /// Configured time to live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current time according to the cache clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Get a fresh value set.
    pub fn get(&self, key: &str) -> Option<FacetValueSet> {
        let raw = self.store.get(key)?;
        let set: FacetValueSet = match serde_json::from_str(&raw) {
            Ok(set) => set,
            Err(e) => {
                warn!(error = %e, key = %key, "discarding undecodable cache entry");
                return None;
            }
        };
        if !set.is_fresh(self.now()) {
            debug!(key = %key, "cache entry past ttl");
            return None;
        }
        Some(set)
    }

    /// Store a value set under the configured ttl.
    pub fn set(&self, key: &str, set: &FacetValueSet) {
        match serde_json::to_string(set) {
            Ok(raw) => self.store.set(key, &raw, self.ttl),
            Err(e) => warn!(error = %e, key = %key, "failed to encode facet value set"),
        }
    }
}

impl std::fmt::Debug for ValueCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueCache")
            .field("ttl", &self.ttl)
            .finish()
    }
}
