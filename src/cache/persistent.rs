//! Durable tier over an injected [`KeyStore`].
//!
//! Expiry is lazy: a lookup drops the entry it finds if it has outlived the
//! TTL, and every insertion sweeps the whole store for expired or corrupt
//! records before applying the capacity bound.

use std::sync::Arc;

use parking_lot::Mutex;

use super::store::{KeyStore, PersistedKeyRecord};
use super::CachedKeyEntry;
use crate::error::CacheError;
use crate::types::DerivedKeySet;

pub(crate) struct PersistentTier {
    store: Arc<dyn KeyStore>,
    capacity: usize,
    ttl_millis: i64,
    /// Serializes read-modify-write sequences (touch, sweep, evict) against the store.
    write_lock: Mutex<()>,
}

impl PersistentTier {
    pub(crate) fn new(store: Arc<dyn KeyStore>, capacity: usize, ttl_millis: i64) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            ttl_millis,
            write_lock: Mutex::new(()),
        }
    }

    fn is_expired(&self, record: &PersistedKeyRecord, now: i64) -> bool {
        now - record.creation_time >= self.ttl_millis
    }

    /// Fetch `uid`, touching its last-access time on a hit.
    ///
    /// # Errors
    /// `CorruptRecord` if the stored value does not decode (the record is
    /// removed first), or `Store` on backend failure.
    pub(crate) fn lookup(&self, uid: &str, now: i64) -> Result<Option<CachedKeyEntry>, CacheError> {
        let _guard = self.write_lock.lock();
        let Some(raw) = self.store.get(uid)? else {
            return Ok(None);
        };

        let (mut record, keys) = match decode(uid, &raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.discard(uid);
                return Err(e);
            }
        };

        if self.is_expired(&record, now) {
            tracing::debug!(uid, "persistent cache entry expired");
            self.discard(uid);
            return Ok(None);
        }

        record.last_access_time = now;
        match serde_json::to_string(&record) {
            Ok(updated) => {
                if let Err(e) = self.store.put(uid, &updated) {
                    tracing::warn!(uid, error = %e, "failed to record cache access time");
                }
            }
            Err(e) => tracing::warn!(uid, error = %e, "failed to encode cache record"),
        }

        Ok(Some(CachedKeyEntry {
            keys,
            creation_time: record.creation_time,
            last_access_time: now,
        }))
    }

    /// Store `entry` under `uid`, sweeping expired records and evicting the
    /// least recently accessed ones while the store is at capacity.
    pub(crate) fn insert(&self, uid: &str, entry: &CachedKeyEntry, now: i64) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock();

        let mut live: Vec<(String, i64)> = Vec::new();
        // Sweep failures on other records never block the write below.
        let keys = self.store.keys().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "cache sweep skipped, key listing failed");
            Vec::new()
        });
        for key in keys {
            if key == uid {
                continue;
            }
            let raw = match self.store.get(&key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(uid = %key, error = %e, "cache sweep could not read record");
                    continue;
                }
            };
            match decode(&key, &raw) {
                Ok((record, _)) if !self.is_expired(&record, now) => {
                    live.push((key, record.last_access_time));
                }
                Ok(_) => {
                    tracing::debug!(uid = %key, "sweeping expired cache entry");
                    self.discard(&key);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "sweeping corrupt cache entry");
                    self.discard(&key);
                }
            }
        }

        live.sort_by_key(|(_, last_access)| *last_access);
        let excess = (live.len() + 1).saturating_sub(self.capacity);
        for (victim, _) in live.iter().take(excess) {
            tracing::debug!(uid = %victim, "evicting persistent cache entry");
            self.discard(victim);
        }

        let record = PersistedKeyRecord {
            keys: entry.keys.to_hex_vec(),
            creation_time: entry.creation_time,
            last_access_time: entry.last_access_time,
        };
        let json = serde_json::to_string(&record).map_err(crate::error::StoreError::from)?;
        self.store.put(uid, &json)?;
        Ok(())
    }

    pub(crate) fn remove(&self, uid: &str) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock();
        self.store.remove(uid)?;
        Ok(())
    }

    pub(crate) fn clear(&self) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock();
        for key in self.store.keys()? {
            self.store.remove(&key)?;
        }
        Ok(())
    }

    fn discard(&self, uid: &str) {
        if let Err(e) = self.store.remove(uid) {
            tracing::warn!(uid, error = %e, "failed to discard cache record");
        }
    }
}

fn decode(uid: &str, raw: &str) -> Result<(PersistedKeyRecord, DerivedKeySet), CacheError> {
    let record: PersistedKeyRecord =
        serde_json::from_str(raw).map_err(|e| CacheError::CorruptRecord {
            uid: uid.to_string(),
            reason: e.to_string(),
        })?;
    let keys = DerivedKeySet::from_hex_slice(&record.keys).ok_or_else(|| {
        CacheError::CorruptRecord {
            uid: uid.to_string(),
            reason: format!("expected 16 six-byte hex keys, got {} entries", record.keys.len()),
        }
    })?;
    Ok((record, keys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::MemoryKeyStore;
    use crate::keys::derive_keys_from_bytes;

    const TTL: i64 = 10_000;

    fn entry(seed: u8, at: i64) -> CachedKeyEntry {
        CachedKeyEntry {
            keys: derive_keys_from_bytes(&[seed, 9, 9, 9]).unwrap(),
            creation_time: at,
            last_access_time: at,
        }
    }

    fn tier(capacity: usize) -> (Arc<MemoryKeyStore>, PersistentTier) {
        let store = Arc::new(MemoryKeyStore::new());
        let tier = PersistentTier::new(store.clone(), capacity, TTL);
        (store, tier)
    }

    #[test]
    fn insert_then_lookup_touches_access_time() {
        let (store, tier) = tier(4);
        tier.insert("AA", &entry(1, 100), 100).unwrap();
        let hit = tier.lookup("AA", 500).unwrap().unwrap();
        assert_eq!(hit.creation_time, 100);
        assert_eq!(hit.last_access_time, 500);

        let raw = store.get("AA").unwrap().unwrap();
        let record: PersistedKeyRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.last_access_time, 500);
        assert_eq!(record.keys.len(), 16);
    }

    #[test]
    fn evicts_least_recently_accessed_at_capacity() {
        let (store, tier) = tier(2);
        tier.insert("AA", &entry(1, 0), 0).unwrap();
        tier.insert("BB", &entry(2, 10), 10).unwrap();
        tier.lookup("AA", 20).unwrap();
        tier.insert("CC", &entry(3, 30), 30).unwrap();
        assert_eq!(store.keys().unwrap(), vec!["AA", "CC"]);
    }

    #[test]
    fn expired_entry_is_absent_and_removed() {
        let (store, tier) = tier(4);
        tier.insert("AA", &entry(1, 0), 0).unwrap();
        assert!(tier.lookup("AA", TTL).unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn insertion_sweeps_expired_entries() {
        let (store, tier) = tier(4);
        tier.insert("AA", &entry(1, 0), 0).unwrap();
        tier.insert("BB", &entry(2, TTL + 1), TTL + 1).unwrap();
        assert_eq!(store.keys().unwrap(), vec!["BB"]);
    }

    #[test]
    fn corrupt_record_is_discarded() {
        let (store, tier) = tier(4);
        store.put("AA", "{not json").unwrap();
        assert!(matches!(
            tier.lookup("AA", 0),
            Err(CacheError::CorruptRecord { .. })
        ));
        assert!(store.get("AA").unwrap().is_none());

        store
            .put("BB", r#"{"keys":["00"],"creationTime":0,"lastAccessTime":0}"#)
            .unwrap();
        assert!(tier.lookup("BB", 0).is_err());
        assert!(store.is_empty());
    }

    /// Store whose `remove` fails for one key.
    struct StuckRecordStore {
        inner: MemoryKeyStore,
        stuck: &'static str,
    }

    impl KeyStore for StuckRecordStore {
        fn get(&self, key: &str) -> Result<Option<String>, crate::error::StoreError> {
            self.inner.get(key)
        }
        fn put(&self, key: &str, value: &str) -> Result<(), crate::error::StoreError> {
            self.inner.put(key, value)
        }
        fn remove(&self, key: &str) -> Result<(), crate::error::StoreError> {
            if key == self.stuck {
                return Err(crate::error::StoreError::Backend("locked row".into()));
            }
            self.inner.remove(key)
        }
        fn keys(&self) -> Result<Vec<String>, crate::error::StoreError> {
            self.inner.keys()
        }
    }

    #[test]
    fn unremovable_record_does_not_block_inserts() {
        let store = Arc::new(StuckRecordStore {
            inner: MemoryKeyStore::new(),
            stuck: "BAD",
        });
        store.put("BAD", "{not json").unwrap();
        let tier = PersistentTier::new(store.clone(), 4, TTL);

        tier.insert("GOOD", &entry(1, 0), 0).unwrap();
        tier.insert("MORE", &entry(2, 5), 5).unwrap();
        assert!(store.get("GOOD").unwrap().is_some());
        assert!(tier.lookup("MORE", 10).unwrap().is_some());
    }
}
