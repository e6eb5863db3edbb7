//! Eviction Policy
//!
//! Bounded key→entry store with least-recently-used eviction and TTL expiry.
//!
//! # Design
//!
//! - Min-heap of keys ordered by `(last_accessed, access_seq)`
//! - Every entry records its own heap slot (`heap_index`), updated on each
//!   swap, so a touch re-establishes order in O(log n) instead of a rebuild
//! - Capacity is enforced one eviction at a time, right before a new key is
//!   inserted, which keeps per-request latency bounded
//! - TTL sweeps are a separate full pass and ignore recency

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;

use super::entry::CacheEntry;

/// Result of a store lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Live entry; its recency was refreshed
    Hit(Bytes),
    /// Entry exists but `now > expires_at`; left in place
    Expired,
    /// No entry for the key
    Miss,
}

/// Capacity-bounded LRU store with an indexed eviction heap
#[derive(Debug)]
pub struct LruStore {
    entries: HashMap<String, CacheEntry>,
    /// Keys arranged as a binary min-heap on entry recency
    heap: Vec<String>,
    capacity: usize,
    next_seq: u64,
}

impl LruStore {
    /// Create an empty store holding at most `capacity` entries.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity.min(4096)),
            heap: Vec::with_capacity(capacity.min(4096)),
            capacity,
            next_seq: 0,
        }
    }

    /// Number of entries, expired ones included
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check if a key is present, expired or not
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Peek at an entry without touching it
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Key that the next eviction would remove
    pub fn peek_lru(&self) -> Option<&str> {
        self.heap.first().map(String::as_str)
    }

    /// Insert or overwrite an entry.
    ///
    /// Inserting a new key into a full store evicts the least-recently-used
    /// entry first; that entry is returned. Overwrites never evict.
    pub fn insert(
        &mut self,
        key: String,
        value: Bytes,
        expires_at: Instant,
        now: Instant,
    ) -> Option<CacheEntry> {
        let seq = self.bump_seq();

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            entry.expires_at = expires_at;
            entry.last_accessed = now;
            entry.access_seq = seq;
            let index = entry.heap_index;
            self.fix(index);
            return None;
        }

        let evicted = self.evict_if_at_capacity();

        let index = self.heap.len();
        self.heap.push(key.clone());
        self.entries
            .insert(key.clone(), CacheEntry::new(key, value, expires_at, now, seq, index));
        self.sift_up(index);

        evicted
    }

    /// Look up a key, refreshing its recency on a live hit.
    ///
    /// Expired entries are reported but not removed; callers decide.
    pub fn lookup(&mut self, key: &str, now: Instant) -> Lookup {
        let value = match self.entries.get(key) {
            None => return Lookup::Miss,
            Some(entry) if entry.is_expired_at(now) => return Lookup::Expired,
            Some(entry) => entry.value.clone(),
        };
        self.touch(key, now);
        Lookup::Hit(value)
    }

    /// Mark a key as just accessed and restore heap order.
    ///
    /// Returns false if the key is not present.
    pub fn touch(&mut self, key: &str, now: Instant) -> bool {
        let seq = self.bump_seq();
        let index = match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_accessed = now;
                entry.access_seq = seq;
                entry.heap_index
            }
            None => return false,
        };
        self.fix(index);
        true
    }

    /// Remove a key
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let index = self.entries.get(key)?.heap_index;
        self.remove_at(index)
    }

    /// Pop the least-recently-used entry; no-op when empty
    pub fn evict_one(&mut self) -> Option<CacheEntry> {
        if self.heap.is_empty() {
            return None;
        }
        self.remove_at(0)
    }

    /// Evict exactly one entry if the store is full
    pub fn evict_if_at_capacity(&mut self) -> Option<CacheEntry> {
        if self.entries.len() >= self.capacity {
            self.evict_one()
        } else {
            None
        }
    }

    /// Remove every entry whose expiry has passed, regardless of recency.
    ///
    /// Returns the number of entries removed.
    pub fn clean_expired(&mut self, now: Instant) -> usize {
        self.remove_where(|entry| entry.is_expired_at(now))
    }

    /// Remove every entry matching `predicate`, returning how many went
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&CacheEntry) -> bool,
    {
        let doomed: Vec<String> = self
            .entries
            .values()
            .filter(|entry| predicate(entry))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &doomed {
            self.remove(key);
        }

        doomed.len()
    }

    /// Drop all entries, returning how many were held
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.heap.clear();
        count
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq = self.next_seq.wrapping_add(1);
        self.next_seq
    }

    fn remove_at(&mut self, index: usize) -> Option<CacheEntry> {
        if index >= self.heap.len() {
            return None;
        }
        let last = self.heap.len() - 1;
        if index != last {
            self.swap(index, last);
        }
        let key = self.heap.pop()?;
        let removed = self.entries.remove(&key);
        if index < self.heap.len() {
            self.fix(index);
        }
        removed
    }

    #[inline]
    fn recency_at(&self, index: usize) -> (Instant, u64) {
        self.entries[&self.heap[index]].recency()
    }

    #[inline]
    fn less(&self, i: usize, j: usize) -> bool {
        self.recency_at(i) < self.recency_at(j)
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        if let Some(entry) = self.entries.get_mut(&self.heap[i]) {
            entry.heap_index = i;
        }
        if let Some(entry) = self.entries.get_mut(&self.heap[j]) {
            entry.heap_index = j;
        }
    }

    /// Re-establish heap order after the entry at `index` changed
    fn fix(&mut self, index: usize) {
        if !self.sift_down(index) {
            self.sift_up(index);
        }
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if !self.less(index, parent) {
                break;
            }
            self.swap(index, parent);
            index = parent;
        }
    }

    /// Returns true if the entry moved down
    fn sift_down(&mut self, start: usize) -> bool {
        let len = self.heap.len();
        let mut index = start;
        loop {
            let left = 2 * index + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.less(right, left) {
                right
            } else {
                left
            };
            if !self.less(child, index) {
                break;
            }
            self.swap(index, child);
            index = child;
        }
        index > start
    }

    #[cfg(test)]
    pub(crate) fn heap_is_consistent(&self) -> bool {
        if self.heap.len() != self.entries.len() {
            return false;
        }
        for (i, key) in self.heap.iter().enumerate() {
            match self.entries.get(key) {
                Some(entry) if entry.heap_index == i => {}
                _ => return false,
            }
            if i > 0 && self.less(i, (i - 1) / 2) {
                return false;
            }
        }
        true
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;

    const HOUR: Duration = Duration::from_secs(3600);

    fn put(store: &mut LruStore, key: &str, now: Instant) -> Option<CacheEntry> {
        store.insert(
            key.to_string(),
            Bytes::copy_from_slice(key.as_bytes()),
            now + HOUR,
            now,
        )
    }

    #[test]
    fn test_insert_and_lookup() {
        let now = Instant::now();
        let mut store = LruStore::new(4);

        assert!(put(&mut store, "a", now).is_none());
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup("a", now), Lookup::Hit(Bytes::from_static(b"a")));
        assert_eq!(store.lookup("b", now), Lookup::Miss);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let store = LruStore::new(0);
        assert_eq!(store.capacity(), 1);
    }

    #[test]
    fn test_evicts_first_inserted_without_reads() {
        let now = Instant::now();
        let mut store = LruStore::new(3);

        for key in ["k1", "k2", "k3"] {
            put(&mut store, key, now);
        }
        let evicted = put(&mut store, "k4", now).expect("store was full");

        assert_eq!(evicted.key(), "k1");
        assert_eq!(store.len(), 3);
        assert!(!store.contains("k1"));
        assert!(store.heap_is_consistent());
    }

    #[test]
    fn test_touch_protects_from_eviction() {
        let now = Instant::now();
        let mut store = LruStore::new(3);

        for key in ["k1", "k2", "k3"] {
            put(&mut store, key, now);
        }
        assert_matches!(store.lookup("k1", now), Lookup::Hit(_));

        let evicted = put(&mut store, "k4", now).expect("store was full");
        assert_eq!(evicted.key(), "k2");
        assert!(store.contains("k1"));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let now = Instant::now();
        let mut store = LruStore::new(2);

        put(&mut store, "a", now);
        put(&mut store, "b", now);
        let evicted = store.insert("a".into(), Bytes::from_static(b"new"), now + HOUR, now);

        assert!(evicted.is_none());
        assert_eq!(store.len(), 2);
        assert_eq!(store.lookup("a", now), Lookup::Hit(Bytes::from_static(b"new")));
        // "a" was refreshed by the overwrite, so "b" is now the oldest
        assert_eq!(store.peek_lru(), Some("b"));
    }

    #[test]
    fn test_lookup_reports_expired_without_removing() {
        let now = Instant::now();
        let mut store = LruStore::new(2);
        store.insert(
            "k".into(),
            Bytes::from_static(b"v"),
            now + Duration::from_secs(1),
            now,
        );

        let later = now + Duration::from_secs(2);
        assert_eq!(store.lookup("k", later), Lookup::Expired);
        assert!(store.contains("k"));
    }

    #[test]
    fn test_clean_expired_ignores_recency() {
        let now = Instant::now();
        let mut store = LruStore::new(8);
        store.insert("short".into(), Bytes::new(), now + Duration::from_secs(1), now);
        store.insert("long".into(), Bytes::new(), now + HOUR, now);
        store.touch("short", now);

        let removed = store.clean_expired(now + Duration::from_secs(5));

        assert_eq!(removed, 1);
        assert!(!store.contains("short"));
        assert!(store.contains("long"));
        assert!(store.heap_is_consistent());
    }

    #[test]
    fn test_remove_and_evict_one() {
        let now = Instant::now();
        let mut store = LruStore::new(8);
        for key in ["a", "b", "c", "d"] {
            put(&mut store, key, now);
        }

        assert!(store.remove("c").is_some());
        assert!(store.remove("c").is_none());
        assert!(store.heap_is_consistent());

        assert_eq!(store.evict_one().map(|e| e.key), Some("a".to_string()));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_evict_one_on_empty_store() {
        let mut store = LruStore::new(2);
        assert!(store.evict_one().is_none());
        assert!(store.evict_if_at_capacity().is_none());
    }

    #[test]
    fn test_heap_stays_consistent_under_churn() {
        let start = Instant::now();
        let mut store = LruStore::new(16);

        for i in 0..200u64 {
            let now = start + Duration::from_millis(i);
            let key = format!("key-{}", i % 37);
            if i % 3 == 0 {
                store.lookup(&format!("key-{}", (i * 7) % 37), now);
            } else if i % 11 == 0 {
                store.remove(&key);
            } else {
                put(&mut store, &key, now);
            }
            assert!(store.len() <= store.capacity());
            assert!(store.heap_is_consistent());
        }
    }

    #[test]
    fn test_remove_where_keeps_heap_consistent() {
        let now = Instant::now();
        let mut store = LruStore::new(8);
        for key in ["a1", "b1", "a2", "b2", "a3"] {
            put(&mut store, key, now);
        }

        assert_eq!(store.remove_where(|entry| entry.key().starts_with('a')), 3);
        assert_eq!(store.len(), 2);
        assert!(store.contains("b1"));
        assert!(store.contains("b2"));
        assert!(store.heap_is_consistent());
        assert_eq!(store.remove_where(|_| false), 0);
    }

    #[test]
    fn test_clear() {
        let now = Instant::now();
        let mut store = LruStore::new(4);
        put(&mut store, "a", now);
        put(&mut store, "b", now);

        assert_eq!(store.clear(), 2);
        assert!(store.is_empty());
        assert!(store.peek_lru().is_none());
    }
}
