//! Two-tier cache for derived sector keys.
//!
//! The memory tier is a bounded LRU; the persistent tier sits on an injected
//! [`KeyStore`]. Persistent-tier failures are counted and logged, then treated
//! as misses so callers always fall back to direct derivation.

mod memory;
mod persistent;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::error::{CacheError, ConfigError, KeyDerivationError};
use crate::keys::derive_keys;
use crate::types::{DerivedKeySet, TagUid};

use memory::{MemoryLookup, MemoryTier};
use persistent::PersistentTier;
pub use store::{KeyStore, MemoryKeyStore, PersistedKeyRecord};

/// A derived key set with its cache timestamps (epoch millis).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedKeyEntry {
    pub keys: DerivedKeySet,
    pub creation_time: i64,
    pub last_access_time: i64,
}

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatistics {
    pub memory_hits: u64,
    pub memory_misses: u64,
    pub persistent_hits: u64,
    pub persistent_misses: u64,
    pub errors: u64,
    pub invalidations: u64,
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicU64,
    memory_misses: AtomicU64,
    persistent_hits: AtomicU64,
    persistent_misses: AtomicU64,
    errors: AtomicU64,
    invalidations: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStatistics {
        CacheStatistics {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            memory_misses: self.memory_misses.load(Ordering::Relaxed),
            persistent_hits: self.persistent_hits.load(Ordering::Relaxed),
            persistent_misses: self.persistent_misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Memoizes [`derive_keys`] per UID.
///
/// Constructed explicitly by the host and shared via `Arc` between scans;
/// all methods take `&self`.
pub struct KeyDerivationCache {
    config: CacheConfig,
    memory: MemoryTier,
    persistent: Option<PersistentTier>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl KeyDerivationCache {
    /// Build a cache over `store` using the system clock.
    pub fn init(config: CacheConfig, store: Arc<dyn KeyStore>) -> Result<Self, ConfigError> {
        Self::with_clock(config, Some(store), Arc::new(SystemClock))
    }

    /// Cache without a durable tier.
    pub fn memory_only(config: CacheConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, None, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: CacheConfig,
        store: Option<Arc<dyn KeyStore>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let persistent = store
            .map(|s| PersistentTier::new(s, config.persistent_capacity, config.ttl_millis));
        tracing::debug!(
            memory_capacity = config.memory_capacity,
            persistent_capacity = config.persistent_capacity,
            ttl_millis = config.ttl_millis,
            persistent = persistent.is_some(),
            "key derivation cache initialized"
        );
        Ok(Self {
            memory: MemoryTier::new(config.memory_capacity),
            config,
            persistent,
            clock,
            counters: Counters::default(),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cached keys for `uid`, promoting persistent hits into memory.
    pub fn get(&self, uid: &TagUid) -> Option<DerivedKeySet> {
        self.get_entry(uid).map(|entry| entry.keys)
    }

    pub fn get_entry(&self, uid: &TagUid) -> Option<CachedKeyEntry> {
        let key = uid.to_hex();
        let now = self.clock.now_millis();

        match self.memory.get(&key, now, self.config.ttl_millis) {
            MemoryLookup::Hit(entry) => {
                Counters::bump(&self.counters.memory_hits);
                return Some(entry);
            }
            MemoryLookup::Expired => {
                tracing::debug!(uid = %key, "memory cache entry expired");
                Counters::bump(&self.counters.memory_misses);
            }
            MemoryLookup::Miss => Counters::bump(&self.counters.memory_misses),
        }

        let persistent = self.persistent.as_ref()?;
        match persistent.lookup(&key, now) {
            Ok(Some(entry)) => {
                Counters::bump(&self.counters.persistent_hits);
                let returned = entry.clone();
                if let Some(evicted) = self.memory.insert(key, entry) {
                    tracing::debug!(uid = %evicted, "evicted from memory tier on promotion");
                }
                Some(returned)
            }
            Ok(None) => {
                Counters::bump(&self.counters.persistent_misses);
                None
            }
            Err(e) => {
                self.record_error(&key, &e);
                Counters::bump(&self.counters.persistent_misses);
                None
            }
        }
    }

    /// Insert into both tiers. Persistent failures are swallowed.
    pub fn put(&self, uid: &TagUid, keys: &DerivedKeySet) {
        let key = uid.to_hex();
        let now = self.clock.now_millis();
        let entry = CachedKeyEntry {
            keys: keys.clone(),
            creation_time: now,
            last_access_time: now,
        };

        if let Some(persistent) = &self.persistent {
            if let Err(e) = persistent.insert(&key, &entry, now) {
                self.record_error(&key, &e);
            }
        }
        if let Some(evicted) = self.memory.insert(key, entry) {
            tracing::debug!(uid = %evicted, "evicted from memory tier");
        }
    }

    /// Cached keys, or derive and cache them.
    ///
    /// # Errors
    /// `InvalidUidLength` from derivation; cache failures never surface.
    pub fn get_or_derive(&self, uid: &TagUid) -> Result<DerivedKeySet, KeyDerivationError> {
        if let Some(keys) = self.get(uid) {
            return Ok(keys);
        }
        let keys = derive_keys(uid)?;
        self.put(uid, &keys);
        Ok(keys)
    }

    pub fn invalidate(&self, uid: &TagUid) {
        let key = uid.to_hex();
        self.memory.remove(&key);
        if let Some(persistent) = &self.persistent {
            if let Err(e) = persistent.remove(&key) {
                self.record_error(&key, &e);
            }
        }
        Counters::bump(&self.counters.invalidations);
    }

    /// Remove every entry from both tiers.
    pub fn clear(&self) {
        self.memory.clear();
        if let Some(persistent) = &self.persistent {
            if let Err(e) = persistent.clear() {
                self.record_error("*", &e);
            }
        }
    }

    pub fn statistics(&self) -> CacheStatistics {
        self.counters.snapshot()
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    pub fn in_memory(&self, uid: &TagUid) -> bool {
        self.memory.contains(&uid.to_hex())
    }

    /// Drop the memory tier. Persistent entries survive for the next `init`.
    pub fn teardown(&self) {
        let stats = self.statistics();
        self.memory.clear();
        tracing::debug!(
            memory_hits = stats.memory_hits,
            persistent_hits = stats.persistent_hits,
            errors = stats.errors,
            "key derivation cache torn down"
        );
    }

    fn record_error(&self, uid: &str, error: &CacheError) {
        Counters::bump(&self.counters.errors);
        tracing::warn!(uid, error = %error, "key cache error, falling back");
    }
}
