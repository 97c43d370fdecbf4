//! Entry Store
//!
//! Concurrent key/value container behind the read-through cache. Knows
//! nothing about TTLs or fetching.
//!
//! # Design
//!
//! - Keys are hashed into a power-of-two number of shards
//! - Each shard has its own RwLock: readers run concurrently, a writer holds
//!   its shard exclusively for the duration of a single-key mutation
//! - Reads hand out clones, never references into the map

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use super::entry::{CacheEntry, CacheKey};

/// Single partition of the store
struct Shard<P> {
    map: RwLock<HashMap<CacheKey, CacheEntry<P>>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl<P> Shard<P> {
    fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }
}

/// Sharded, reader/writer-locked map from cache key to entry
pub struct EntryStore<P> {
    shards: Box<[Shard<P>]>,
}

impl<P> EntryStore<P> {
    /// Create a store with `shard_count` partitions (rounded up to a power of two)
    pub fn new(shard_count: usize) -> Self {
        let count = shard_count.max(1).next_power_of_two();
        let shards: Vec<Shard<P>> = (0..count).map(|_| Shard::new()).collect();
        Self {
            shards: shards.into_boxed_slice(),
        }
    }

    /// Number of partitions
    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    fn shard_for(&self, key: &CacheKey) -> &Shard<P> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) & (self.shards.len() - 1);
        &self.shards[idx]
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.map.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.map.read().is_empty())
    }

    /// Total read operations
    pub fn total_reads(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| s.reads.load(Ordering::Relaxed))
            .sum()
    }

    /// Total write operations
    pub fn total_writes(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| s.writes.load(Ordering::Relaxed))
            .sum()
    }

    /// Replace the entry for `key`, returning the previous one.
    ///
    /// `stored_at` never moves backwards for a key: if the previous entry is
    /// newer than the incoming one, the incoming entry inherits its timestamp.
    pub fn put(&self, key: CacheKey, mut entry: CacheEntry<P>) -> Option<CacheEntry<P>> {
        let shard = self.shard_for(&key);
        shard.writes.fetch_add(1, Ordering::Relaxed);
        let mut guard = shard.map.write();

        if let Some(previous) = guard.get(&key) {
            if previous.stored_at > entry.stored_at {
                entry.stored_at = previous.stored_at;
            }
        }
        guard.insert(key, entry)
    }

    /// Remove the entry for `key`; a missing key is a no-op
    pub fn delete(&self, key: &CacheKey) -> Option<CacheEntry<P>> {
        let shard = self.shard_for(key);
        shard.writes.fetch_add(1, Ordering::Relaxed);
        shard.map.write().remove(key)
    }

    /// Remove the entry for `key` only if `predicate` holds for the entry
    /// present at the moment of removal.
    ///
    /// The predicate runs under an upgradable read lock; the shard is only
    /// locked exclusively (and counted as a write) when the entry goes.
    pub fn remove_if<F>(&self, key: &CacheKey, predicate: F) -> Option<CacheEntry<P>>
    where
        F: FnOnce(&CacheEntry<P>) -> bool,
    {
        let shard = self.shard_for(key);
        let guard = shard.map.upgradable_read();

        if !guard.get(key).is_some_and(predicate) {
            return None;
        }

        shard.writes.fetch_add(1, Ordering::Relaxed);
        RwLockUpgradableReadGuard::upgrade(guard).remove(key)
    }

    /// Remove every entry
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.writes.fetch_add(1, Ordering::Relaxed);
            shard.map.write().clear();
        }
    }
}

impl<P: Clone> EntryStore<P> {
    /// Snapshot of the entry for `key`
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry<P>> {
        let shard = self.shard_for(key);
        shard.reads.fetch_add(1, Ordering::Relaxed);
        let guard = shard.map.read();
        guard.get(key).cloned()
    }

    /// All keys currently present
    pub fn keys(&self) -> Vec<CacheKey> {
        self.shards
            .iter()
            .flat_map(|s| s.map.read().keys().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Point-in-time copy of every entry.
    ///
    /// All shard read locks are held together while copying, so no write can
    /// land between two shards of the same snapshot. Writers only ever lock a
    /// single shard, so acquiring in index order cannot deadlock.
    pub fn snapshot(&self) -> HashMap<CacheKey, CacheEntry<P>> {
        let guards: Vec<_> = self
            .shards
            .iter()
            .map(|s| {
                s.reads.fetch_add(1, Ordering::Relaxed);
                s.map.read()
            })
            .collect();

        let mut out = HashMap::with_capacity(guards.iter().map(|g| g.len()).sum());
        for guard in &guards {
            out.extend(guard.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        out
    }
}

impl<P> Default for EntryStore<P> {
    fn default() -> Self {
        Self::new(super::DEFAULT_SHARD_COUNT)
    }
}

impl<P> std::fmt::Debug for EntryStore<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStore")
            .field("shards", &self.shard_count())
            .field("entries", &self.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
