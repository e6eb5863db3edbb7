//! Hot Tier - Front-side LRU Cache
//!
//! Small fixed-capacity cache consulted before any shard lookup. Every `set`
//! lands here synchronously, which is what gives callers read-your-write
//! while the shard write is still queued.
//!
//! # Design
//!
//! - Single lock, single LRU heap, not partitioned by node
//! - Expired entries read as absent but stay put until overwritten, swept,
//!   or purged
//! - Purged wholesale by the memory monitor under pressure

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use super::clock::SharedClock;
use super::entry::{expiry_from, CacheEntry};
use super::policy::{Lookup, LruStore};

/// Default hot tier capacity (entries)
pub const DEFAULT_HOT_CAPACITY: usize = 1024;

/// Front-side LRU cache
pub struct HotTier {
    store: Mutex<LruStore>,
    clock: SharedClock,
    default_ttl: Duration,
    /// Hit count
    hits: AtomicU64,
    /// Miss count
    misses: AtomicU64,
    /// Eviction count
    evictions: AtomicU64,
    /// Number of wholesale purges
    purges: AtomicU64,
}

impl HotTier {
    /// Create a hot tier holding at most `capacity` entries
    pub fn new(capacity: usize, default_ttl: Duration, clock: SharedClock) -> Self {
        Self {
            store: Mutex::new(LruStore::new(capacity)),
            clock,
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            purges: AtomicU64::new(0),
        }
    }

    /// Put an entry, evicting the least-recently-used one when full
    pub fn put(&self, key: String, value: Bytes, ttl: Option<Duration>) -> Option<CacheEntry> {
        let now = self.clock.now();
        let expires_at = expiry_from(now, ttl, self.default_ttl);
        let evicted = self.store.lock().insert(key, value, expires_at, now);
        if evicted.is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }

    /// Get a live entry. Expired entries are a miss and are left in place.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let now = self.clock.now();
        let lookup = self.store.lock().lookup(key, now);
        match lookup {
            Lookup::Hit(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Lookup::Expired | Lookup::Miss => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Check if the tier holds a key, expired or not
    pub fn contains(&self, key: &str) -> bool {
        self.store.lock().contains(key)
    }

    /// Empty the tier unconditionally, returning the number of entries dropped
    pub fn purge_all(&self) -> usize {
        self.purges.fetch_add(1, Ordering::Relaxed);
        self.store.lock().clear()
    }

    /// Drop every entry whose key matches `predicate`
    pub fn remove_keys_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        self.store.lock().remove_where(|entry| predicate(entry.key()))
    }

    /// Remove expired entries
    pub fn clean_expired(&self) -> usize {
        let now = self.clock.now();
        self.store.lock().clean_expired(now)
    }

    /// Get number of entries
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    /// Check if the tier is empty
    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    /// Get capacity
    pub fn capacity(&self) -> usize {
        self.store.lock().capacity()
    }

    /// Get hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get hit ratio
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Get eviction count
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Get purge count
    pub fn purges(&self) -> u64 {
        self.purges.load(Ordering::Relaxed)
    }

    /// Get utilization (0.0 - 1.0)
    pub fn utilization(&self) -> f64 {
        let store = self.store.lock();
        store.len() as f64 / store.capacity() as f64
    }

    /// Get tier statistics
    pub fn stats(&self) -> HotTierStats {
        HotTierStats {
            entries: self.len(),
            capacity: self.capacity(),
            hits: self.hits(),
            misses: self.misses(),
            hit_ratio: self.hit_ratio(),
            evictions: self.evictions(),
            purges: self.purges(),
            utilization: self.utilization(),
        }
    }
}

/// Hot tier statistics
#[derive(Debug, Clone)]
pub struct HotTierStats {
    /// Number of entries
    pub entries: usize,
    /// Capacity in entries
    pub capacity: usize,
    /// Hit count
    pub hits: u64,
    /// Miss count
    pub misses: u64,
    /// Hit ratio (0.0 - 1.0)
    pub hit_ratio: f64,
    /// Eviction count
    pub evictions: u64,
    /// Wholesale purge count
    pub purges: u64,
    /// Utilization (0.0 - 1.0)
    pub utilization: f64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::{ManualClock, SystemClock};
    use crate::cache::entry::DEFAULT_TTL;
    use std::sync::Arc;

    fn tier(capacity: usize) -> HotTier {
        HotTier::new(capacity, DEFAULT_TTL, Arc::new(SystemClock))
    }

    #[test]
    fn test_hot_tier_put_get() {
        let tier = tier(8);
        tier.put("a".into(), Bytes::from_static(b"1"), None);

        assert_eq!(tier.get("a"), Some(Bytes::from_static(b"1")));
        assert_eq!(tier.get("b"), None);
        assert_eq!(tier.hits(), 1);
        assert_eq!(tier.misses(), 1);
        assert_eq!(tier.hit_ratio(), 0.5);
    }

    #[test]
    fn test_capacity_two_evicts_oldest() {
        let tier = tier(2);
        tier.put("a".into(), Bytes::from_static(b"1"), None);
        tier.put("b".into(), Bytes::from_static(b"2"), None);
        tier.put("c".into(), Bytes::from_static(b"3"), None);

        assert_eq!(tier.get("a"), None);
        assert_eq!(tier.get("c"), Some(Bytes::from_static(b"3")));
        assert_eq!(tier.len(), 2);
        assert_eq!(tier.evictions(), 1);
    }

    #[test]
    fn test_expired_entry_is_absent_but_not_deleted() {
        let clock = Arc::new(ManualClock::new());
        let tier = HotTier::new(4, DEFAULT_TTL, clock.clone());
        tier.put("k".into(), Bytes::from_static(b"v"), Some(Duration::from_secs(5)));

        clock.advance(Duration::from_secs(6));

        assert_eq!(tier.get("k"), None);
        assert!(tier.contains("k"));

        // Overwrite revives it lazily
        tier.put("k".into(), Bytes::from_static(b"v2"), None);
        assert_eq!(tier.get("k"), Some(Bytes::from_static(b"v2")));
    }

    #[test]
    fn test_purge_all() {
        let tier = tier(16);
        for i in 0..10 {
            tier.put(format!("k{}", i), Bytes::new(), None);
        }

        assert_eq!(tier.purge_all(), 10);
        assert!(tier.is_empty());
        assert_eq!(tier.purges(), 1);
        assert_eq!(tier.purge_all(), 0);
    }

    #[test]
    fn test_clean_expired() {
        let clock = Arc::new(ManualClock::new());
        let tier = HotTier::new(4, DEFAULT_TTL, clock.clone());
        tier.put("short".into(), Bytes::new(), Some(Duration::from_secs(1)));
        tier.put("long".into(), Bytes::new(), None);

        clock.advance(Duration::from_secs(2));

        assert_eq!(tier.clean_expired(), 1);
        assert!(tier.contains("long"));
    }

    #[test]
    fn test_stats() {
        let tier = tier(4);
        tier.put("a".into(), Bytes::new(), None);
        tier.get("a");

        let stats = tier.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.capacity, 4);
        assert_eq!(stats.hits, 1);
        assert!((stats.utilization - 0.25).abs() < f64::EPSILON);
    }
}
