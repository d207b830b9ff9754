//! Bounded in-memory LRU tier.
//!
//! Lookups hold the read lock and record recency through per-slot atomics,
//! so concurrent scans of different tags never serialize on a hit.
//! Insertion, eviction, and removal take the write lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::RwLock;

use super::CachedKeyEntry;
use crate::types::DerivedKeySet;

struct Slot {
    keys: DerivedKeySet,
    creation_time: i64,
    last_access_time: AtomicI64,
    /// Monotonic access stamp; the smallest value is least recently used.
    recency: AtomicU64,
}

impl Slot {
    fn snapshot(&self) -> CachedKeyEntry {
        CachedKeyEntry {
            keys: self.keys.clone(),
            creation_time: self.creation_time,
            last_access_time: self.last_access_time.load(Ordering::Relaxed),
        }
    }
}

pub(crate) struct MemoryTier {
    capacity: usize,
    slots: RwLock<HashMap<String, Slot>>,
    tick: AtomicU64,
}

/// Outcome of a memory-tier lookup.
pub(crate) enum MemoryLookup {
    Hit(CachedKeyEntry),
    Expired,
    Miss,
}

impl MemoryTier {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: RwLock::new(HashMap::new()),
            tick: AtomicU64::new(0),
        }
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up `uid`, refreshing its access time on a hit.
    ///
    /// Entries created more than `ttl_millis` before `now` are removed.
    pub(crate) fn get(&self, uid: &str, now: i64, ttl_millis: i64) -> MemoryLookup {
        {
            let slots = self.slots.read();
            match slots.get(uid) {
                None => return MemoryLookup::Miss,
                Some(slot) if now - slot.creation_time < ttl_millis => {
                    slot.last_access_time.store(now, Ordering::Relaxed);
                    slot.recency.store(self.next_tick(), Ordering::Relaxed);
                    return MemoryLookup::Hit(slot.snapshot());
                }
                Some(_) => {}
            }
        }
        self.recheck_expired(uid, now, ttl_millis)
    }

    /// Write-locked expiry check after a stale read. A concurrent `insert`
    /// may have refreshed the slot, in which case it is a hit.
    fn recheck_expired(&self, uid: &str, now: i64, ttl_millis: i64) -> MemoryLookup {
        let mut slots = self.slots.write();
        match slots.get(uid) {
            Some(slot) if now - slot.creation_time < ttl_millis => {
                slot.last_access_time.store(now, Ordering::Relaxed);
                slot.recency.store(self.next_tick(), Ordering::Relaxed);
                MemoryLookup::Hit(slot.snapshot())
            }
            Some(_) => {
                slots.remove(uid);
                MemoryLookup::Expired
            }
            None => MemoryLookup::Expired,
        }
    }

    /// Insert or replace. Returns the UID evicted to make room, if any.
    pub(crate) fn insert(&self, uid: String, entry: CachedKeyEntry) -> Option<String> {
        let CachedKeyEntry {
            keys,
            creation_time,
            last_access_time,
        } = entry;
        let slot = Slot {
            keys,
            creation_time,
            last_access_time: AtomicI64::new(last_access_time),
            recency: AtomicU64::new(self.next_tick()),
        };

        let mut slots = self.slots.write();
        let mut evicted = None;
        if !slots.contains_key(&uid) && slots.len() >= self.capacity {
            evicted = slots
                .iter()
                .min_by_key(|(_, s)| s.recency.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone());
            if let Some(ref victim) = evicted {
                slots.remove(victim);
            }
        }
        slots.insert(uid, slot);
        evicted
    }

    pub(crate) fn remove(&self, uid: &str) -> bool {
        self.slots.write().remove(uid).is_some()
    }

    pub(crate) fn contains(&self, uid: &str) -> bool {
        self.slots.read().contains_key(uid)
    }

    pub(crate) fn clear(&self) {
        self.slots.write().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.read().len()
    }
}
