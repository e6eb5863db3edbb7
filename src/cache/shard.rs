//! Shard Implementation
//!
//! The partition of cache storage owned by one ring node.
//!
//! # Design
//!
//! - One lock per shard, independent of every other shard
//! - Capacity enforced per shard by single-entry LRU eviction
//! - Expired entries read as absent and are deleted on the read path, so
//!   stale data does not pile up between sweeps

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use super::clock::SharedClock;
use super::entry::{expiry_from, CacheEntry};
use super::policy::{Lookup, LruStore};

/// Storage partition owned by a single node
pub struct Shard {
    node_id: String,
    store: Mutex<LruStore>,
    clock: SharedClock,
    default_ttl: Duration,
    /// Number of reads
    reads: AtomicU64,
    /// Number of writes
    writes: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Shard {
    /// Create an empty shard for `node_id`
    pub fn new(
        node_id: impl Into<String>,
        capacity: usize,
        default_ttl: Duration,
        clock: SharedClock,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            store: Mutex::new(LruStore::new(capacity)),
            clock,
            default_ttl,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Owning node
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Insert or overwrite a key, evicting the LRU entry if the shard is full.
    ///
    /// Returns the evicted entry, if any.
    pub fn put(&self, key: String, value: Bytes, ttl: Option<Duration>) -> Option<CacheEntry> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let expires_at = expiry_from(now, ttl, self.default_ttl);
        let evicted = self.store.lock().insert(key, value, expires_at, now);
        if evicted.is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }

    /// Read a key. Expired entries are removed and reported as absent.
    pub fn fetch(&self, key: &str) -> ShardRead {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let read = {
            let mut store = self.store.lock();
            match store.lookup(key, now) {
                Lookup::Hit(value) => ShardRead::Hit(value),
                Lookup::Expired => {
                    store.remove(key);
                    ShardRead::Expired
                }
                Lookup::Miss => ShardRead::Miss,
            }
        };
        match read {
            ShardRead::Hit(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            _ => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        read
    }

    /// Remove every expired entry, returning how many were removed
    pub fn clean_expired(&self) -> usize {
        let now = self.clock.now();
        self.store.lock().clean_expired(now)
    }

    /// Discard every entry. Nothing is migrated anywhere.
    pub fn drop_all(&self) -> usize {
        self.store.lock().clear()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    /// Check if the shard is empty
    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.store.lock().capacity()
    }

    /// Get read count
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Get write count
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Get statistics
    pub fn stats(&self) -> ShardStats {
        let (entries, capacity) = {
            let store = self.store.lock();
            (store.len(), store.capacity())
        };
        ShardStats {
            node_id: self.node_id.clone(),
            entries,
            capacity,
            reads: self.read_count(),
            writes: self.write_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Per-shard statistics
#[derive(Debug, Clone)]
pub struct ShardStats {
    pub node_id: String,
    pub entries: usize,
    pub capacity: usize,
    pub reads: u64,
    pub writes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("node_id", &self.node_id)
            .field("len", &self.len())
            .field("reads", &self.read_count())
            .field("writes", &self.write_count())
            .finish()
    }
}

/// Outcome of a shard read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardRead {
    /// Live value
    Hit(Bytes),
    /// Entry had expired and was deleted
    Expired,
    /// No entry
    Miss,
}

impl ShardRead {
    /// Value on a hit
    pub fn into_value(self) -> Option<Bytes> {
        match self {
            ShardRead::Hit(value) => Some(value),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
