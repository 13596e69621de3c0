//! # Sharded Cache
//!
//! Provide the replica-local store: a fixed number of shards, each holding
//! an LRU-ordered set of versioned entries with a uniform TTL.
//!
//! ## Design Principles
//!
//! 1. **Sharded Locks**: Keys map to shards by hash, so unrelated keys never
//!    contend on the same lock.
//! 2. **Index-Based LRU**: Each shard threads an intrusive list through a
//!    dense entry arena; recency updates are O(1) without heap pointers.
//! 3. **Lazy Expiration**: TTL is checked on lookup; an expired entry is
//!    removed in the same critical section that observed it.
//! 4. **Versioned Entries**: Overwriting a present key bumps its version;
//!    the coordinator uses the version as merge priority across replicas.
//!
//! ## Structure Overview
//!
//! ```text
//! ShardedCache
//!   └── shards: Vec<Shard>
//!         └── Shard { capacity, inner: RwLock<ShardInner> }
//!               ├── map: HashMap<Arc<[u8]>, usize>
//!               ├── entries: Vec<Option<Entry>>
//!               ├── free: Vec<usize>
//!               └── head (eviction victim) / tail (most recent)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::RwLock;

/// FNV-1a 32-bit offset basis.
const FNV_OFFSET: u32 = 2_166_136_261;
/// FNV-1a 32-bit prime.
const FNV_PRIME: u32 = 16_777_619;

/// Hashes a key to its shard with FNV-1a.
///
/// This hash only spreads keys across shards; ring placement uses its own
/// hash and the two need not agree.
fn fnv1a(key: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET;
    for &byte in key {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Single cache entry inside a shard arena.
#[derive(Debug)]
struct Entry {
    // Shared key buffer; the map holds the same Arc.
    key: Arc<[u8]>,
    value: Arc<[u8]>,
    // Bumped on every overwrite of a present key; 0 for a fresh insert.
    version: u32,
    // Absolute deadline; the entry is invalid strictly after this point.
    expires_at: Instant,
    // Intrusive LRU links, stored as arena indices.
    prev: Option<usize>,
    next: Option<usize>,
}

/// Per-shard storage: lookup map plus the LRU arena.
#[derive(Debug)]
struct ShardInner {
    map: HashMap<Arc<[u8]>, usize, RandomState>,
    entries: Vec<Option<Entry>>,
    free: Vec<usize>,
    /// Least recently used entry; the eviction victim.
    head: Option<usize>,
    /// Most recently used entry.
    tail: Option<usize>,
}

impl ShardInner {
    fn new(hash_state: RandomState) -> Self {
        ShardInner {
            map: HashMap::with_hasher(hash_state),
            entries: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    /// Detaches `idx` from the recency list without touching the map.
    fn lru_remove(&mut self, idx: usize) {
        let (prev, next) = match self.entries[idx].as_ref() {
            Some(entry) => (entry.prev, entry.next),
            None => return,
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_entry) = self.entries[prev_idx].as_mut() {
                    prev_entry.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next_idx) => {
                if let Some(next_entry) = self.entries[next_idx].as_mut() {
                    next_entry.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(entry) = self.entries[idx].as_mut() {
            entry.prev = None;
            entry.next = None;
        }
    }

    /// Appends `idx` at the most-recent end.
    fn lru_push_back(&mut self, idx: usize) {
        let tail = self.tail;
        if let Some(entry) = self.entries[idx].as_mut() {
            entry.prev = tail;
            entry.next = None;
        }

        match tail {
            Some(tail_idx) => {
                if let Some(tail_entry) = self.entries[tail_idx].as_mut() {
                    tail_entry.next = Some(idx);
                }
            }
            None => self.head = Some(idx),
        }

        self.tail = Some(idx);
    }

    /// Marks `idx` as just used.
    fn touch(&mut self, idx: usize) {
        if self.tail == Some(idx) {
            return;
        }
        self.lru_remove(idx);
        self.lru_push_back(idx);
    }

    /// Inserts a fresh entry, reusing a free arena slot when one exists.
    fn insert_new(&mut self, key: Arc<[u8]>, value: Arc<[u8]>, expires_at: Instant) {
        let idx = self.free.pop().unwrap_or_else(|| {
            self.entries.push(None);
            self.entries.len() - 1
        });

        self.entries[idx] = Some(Entry {
            key: Arc::clone(&key),
            value,
            version: 0,
            expires_at,
            prev: None,
            next: None,
        });
        self.lru_push_back(idx);
        self.map.insert(key, idx);
    }

    /// Removes the entry at `idx` from the map, list, and arena.
    fn remove_idx(&mut self, idx: usize) {
        let key = match self.entries[idx].as_ref() {
            Some(entry) => Arc::clone(&entry.key),
            None => return,
        };

        // Detach first so neighbor links stay valid while the slot clears.
        self.lru_remove(idx);
        self.entries[idx] = None;
        self.map.remove(key.as_ref());
        self.free.push(idx);
    }

    /// Evicts the least recently used entry, if any.
    fn pop_lru(&mut self) -> bool {
        match self.head {
            Some(idx) => {
                self.remove_idx(idx);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug)]
struct Shard {
    capacity: usize,
    inner: RwLock<ShardInner>,
}

/// Point-in-time snapshot of the engine counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Sharded LRU + TTL store with versioned entries.
///
/// Capacity is split evenly across shards by integer division (minimum one
/// entry per shard), so the effective total can land slightly below the
/// configured value when it does not divide evenly.
#[derive(Debug)]
pub struct ShardedCache {
    shards: Vec<Shard>,
    ttl: Duration,
    counters: Counters,
}

impl ShardedCache {
    /// Creates a cache with `num_shards` shards sharing `capacity` entries.
    ///
    /// Both `num_shards` and the per-shard capacity are clamped to at
    /// least 1.
    pub fn new(num_shards: usize, capacity: usize, ttl: Duration) -> Self {
        let num_shards = num_shards.max(1);
        let per_shard = (capacity / num_shards).max(1);
        let hash_state = RandomState::new();

        let shards = (0..num_shards)
            .map(|_| Shard {
                capacity: per_shard,
                inner: RwLock::new(ShardInner::new(hash_state.clone())),
            })
            .collect();

        ShardedCache {
            shards,
            ttl,
            counters: Counters::default(),
        }
    }

    fn shard_for(&self, key: &[u8]) -> &Shard {
        &self.shards[fnv1a(key) as usize % self.shards.len()]
    }

    /// Inserts or overwrites a key.
    ///
    /// A present key (expired or not) keeps its identity: the version is
    /// bumped and the TTL restarts from now. A fresh key starts at version 0
    /// and may evict the shard's least recently used entry to make room.
    pub fn insert(&self, key: &[u8], value: &[u8]) {
        let shard = self.shard_for(key);
        let expires_at = Instant::now() + self.ttl;
        let value: Arc<[u8]> = Arc::from(value);
        let mut inner = shard.inner.write();

        if let Some(&idx) = inner.map.get(key) {
            if let Some(entry) = inner.entries[idx].as_mut() {
                entry.value = value;
                entry.version = entry.version.wrapping_add(1);
                entry.expires_at = expires_at;
            }
            inner.touch(idx);
            return;
        }

        if inner.map.len() >= shard.capacity && inner.pop_lru() {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
        inner.insert_new(Arc::from(key), value, expires_at);
    }

    /// Looks a key up, returning its value and version on a live hit.
    ///
    /// An entry past its deadline is removed here and reported as a miss.
    /// Hits reorder the recency list, so lookups take the shard lock
    /// exclusively.
    pub fn lookup(&self, key: &[u8]) -> Option<(Arc<[u8]>, u32)> {
        let shard = self.shard_for(key);
        let now = Instant::now();
        let mut inner = shard.inner.write();

        let idx = match inner.map.get(key) {
            Some(&idx) => idx,
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let expired = match inner.entries[idx].as_ref() {
            Some(entry) => now > entry.expires_at,
            None => true,
        };
        if expired {
            inner.remove_idx(idx);
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let found = inner.entries[idx]
            .as_ref()
            .map(|entry| (Arc::clone(&entry.value), entry.version));
        inner.touch(idx);
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Returns the number of live-or-expired entries currently stored.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.inner.read().map.len()).sum()
    }

    /// Returns true when no shard holds any entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots the hit/miss/eviction/expiration counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn set_get_round_trip() {
        let cache = ShardedCache::new(4, 100, HOUR);
        cache.insert(b"alpha", b"one");

        let (value, version) = cache.lookup(b"alpha").expect("hit");
        assert_eq!(&*value, b"one");
        assert_eq!(version, 0);
    }

    #[test]
    fn overwrite_bumps_version_and_replaces_value() {
        let cache = ShardedCache::new(1, 100, HOUR);
        cache.insert(b"alpha", b"one");
        cache.insert(b"alpha", b"two");

        let (value, version) = cache.lookup(b"alpha").expect("hit");
        assert_eq!(&*value, b"two");
        assert_eq!(version, 1);
    }

    #[test]
    fn lru_evicts_the_oldest_entry() {
        let cache = ShardedCache::new(1, 2, HOUR);
        cache.insert(b"a", b"1");
        cache.insert(b"b", b"2");
        cache.insert(b"c", b"3");

        assert!(cache.lookup(b"a").is_none());
        assert!(cache.lookup(b"b").is_some());
        assert!(cache.lookup(b"c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn lookup_refreshes_recency() {
        let cache = ShardedCache::new(1, 2, HOUR);
        cache.insert(b"a", b"1");
        cache.insert(b"b", b"2");
        cache.lookup(b"a").expect("hit");
        cache.insert(b"c", b"3");

        assert!(cache.lookup(b"b").is_none());
        assert!(cache.lookup(b"a").is_some());
        assert!(cache.lookup(b"c").is_some());
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = ShardedCache::new(1, 10, Duration::from_millis(1));
        cache.insert(b"alpha", b"one");
        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.lookup(b"alpha").is_none());
        assert_eq!(cache.stats().expirations, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn overwrite_refreshes_ttl() {
        let cache = ShardedCache::new(1, 10, Duration::from_millis(200));
        cache.insert(b"alpha", b"one");
        std::thread::sleep(Duration::from_millis(120));
        cache.insert(b"alpha", b"two");
        std::thread::sleep(Duration::from_millis(120));

        // 240ms after the first insert, but only 120ms after the refresh.
        let (value, version) = cache.lookup(b"alpha").expect("hit");
        assert_eq!(&*value, b"two");
        assert_eq!(version, 1);
    }

    #[test]
    fn total_size_stays_within_capacity() {
        let cache = ShardedCache::new(4, 8, HOUR);
        for i in 0..64u32 {
            cache.insert(format!("key-{i}").as_bytes(), b"v");
        }
        assert!(cache.len() <= 8);
        assert!(!cache.is_empty());
    }

    #[test]
    fn tiny_capacity_still_grants_one_slot_per_shard() {
        let cache = ShardedCache::new(8, 4, HOUR);
        for i in 0..64u32 {
            cache.insert(format!("key-{i}").as_bytes(), b"v");
        }
        assert!(cache.len() <= 8);
        assert!(!cache.is_empty());
    }

    #[test]
    fn version_restarts_after_eviction() {
        let cache = ShardedCache::new(1, 1, HOUR);
        cache.insert(b"a", b"1");
        cache.insert(b"a", b"2");
        cache.insert(b"b", b"3");
        cache.insert(b"a", b"4");

        let (_, version) = cache.lookup(b"a").expect("hit");
        assert_eq!(version, 0);
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let cache = ShardedCache::new(2, 10, HOUR);
        cache.insert(b"alpha", b"one");
        cache.lookup(b"alpha");
        cache.lookup(b"alpha");
        cache.lookup(b"missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }
}
