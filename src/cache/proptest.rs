//! Property-Based Tests for the Cache Core
//!
//! # Test Properties
//!
//! 1. **Ring Determinism**: identical membership gives identical owners
//! 2. **Membership Idempotence**: repeated add/remove leaves the ring unchanged
//! 3. **Capacity Bound**: a store never holds more than its capacity
//! 4. **LRU Order**: eviction matches a reference recency list

#![cfg(test)]

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;
use proptest::prelude::*;

use super::policy::{Lookup, LruStore};
use super::ring::HashRing;

// =============================================================================
// Property Strategies
// =============================================================================

fn node_set_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[a-z]{1,8}", 1..8).prop_map(|s| s.into_iter().collect())
}

fn keys_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[ -~]{0,32}", 1..200)
}

#[derive(Debug, Clone)]
enum StoreOp {
    Insert(u8),
    Lookup(u8),
    Remove(u8),
}

/// Small key space so operations collide often
fn store_ops_strategy() -> impl Strategy<Value = Vec<StoreOp>> {
    prop::collection::vec(
        prop_oneof![
            3 => (0u8..24).prop_map(StoreOp::Insert),
            2 => (0u8..24).prop_map(StoreOp::Lookup),
            1 => (0u8..24).prop_map(StoreOp::Remove),
        ],
        1..300,
    )
}

// =============================================================================
// Ring Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Two rings built the same way agree on every key, and repeated lookups
    /// on one ring agree with themselves.
    #[test]
    fn prop_ring_lookup_deterministic(nodes in node_set_strategy(), keys in keys_strategy()) {
        let a = HashRing::new(20);
        let b = HashRing::new(20);
        for node in &nodes {
            a.add(node);
            b.add(node);
        }

        for key in &keys {
            let owner = a.get(key);
            prop_assert!(owner.is_some());
            prop_assert_eq!(&owner, &a.get(key));
            prop_assert_eq!(&owner, &b.get(key));
            prop_assert!(nodes.contains(owner.as_ref().unwrap()));
        }
    }

    #[test]
    fn prop_ring_membership_idempotent(nodes in node_set_strategy()) {
        let ring = HashRing::new(20);
        for node in &nodes {
            ring.add(node);
        }
        let points = ring.points();

        for node in &nodes {
            prop_assert!(!ring.add(node));
        }
        prop_assert_eq!(ring.points(), points);

        for node in &nodes {
            prop_assert!(ring.remove(node));
            prop_assert!(!ring.remove(node));
        }
        prop_assert_eq!(ring.point_count(), 0);
        prop_assert!(ring.get("any").is_none());
    }

    /// Removing a node only remaps the keys it owned
    #[test]
    fn prop_ring_remove_moves_only_owned_keys(
        nodes in node_set_strategy(),
        keys in keys_strategy(),
        victim in any::<prop::sample::Index>(),
    ) {
        prop_assume!(nodes.len() > 1);
        let ring = HashRing::new(20);
        for node in &nodes {
            ring.add(node);
        }
        let victim = victim.get(&nodes).clone();
        let before: Vec<Option<String>> = keys.iter().map(|k| ring.get(k)).collect();

        ring.remove(&victim);

        for (key, owner) in keys.iter().zip(before) {
            if owner.as_deref() != Some(victim.as_str()) {
                prop_assert_eq!(ring.get(key), owner);
            } else {
                prop_assert_ne!(ring.get(key), Some(victim.clone()));
            }
        }
    }
}

// =============================================================================
// Store Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_store_matches_reference_lru(capacity in 1usize..12, ops in store_ops_strategy()) {
        let now = Instant::now();
        let expires_at = now + Duration::from_secs(3600);
        let mut store = LruStore::new(capacity);
        // Front is least recently used
        let mut model: VecDeque<String> = VecDeque::new();

        for op in ops {
            match op {
                StoreOp::Insert(k) => {
                    let key = format!("k{}", k);
                    let evicted = store.insert(key.clone(), Bytes::new(), expires_at, now);

                    let expected = if let Some(pos) = model.iter().position(|m| *m == key) {
                        model.remove(pos);
                        None
                    } else if model.len() >= capacity {
                        model.pop_front()
                    } else {
                        None
                    };
                    model.push_back(key);

                    prop_assert_eq!(evicted.map(|e| e.key().to_string()), expected);
                }
                StoreOp::Lookup(k) => {
                    let key = format!("k{}", k);
                    let hit = matches!(store.lookup(&key, now), Lookup::Hit(_));
                    if let Some(pos) = model.iter().position(|m| *m == key) {
                        prop_assert!(hit);
                        let key = model.remove(pos).unwrap();
                        model.push_back(key);
                    } else {
                        prop_assert!(!hit);
                    }
                }
                StoreOp::Remove(k) => {
                    let key = format!("k{}", k);
                    let removed = store.remove(&key).is_some();
                    let pos = model.iter().position(|m| *m == key);
                    prop_assert_eq!(removed, pos.is_some());
                    if let Some(pos) = pos {
                        model.remove(pos);
                    }
                }
            }

            prop_assert!(store.len() <= capacity);
            prop_assert_eq!(store.len(), model.len());
            prop_assert_eq!(store.peek_lru(), model.front().map(String::as_str));
            prop_assert!(store.heap_is_consistent());
        }
    }

    #[test]
    fn prop_clean_expired_removes_exactly_expired(
        ttls in prop::collection::vec(1u64..100, 1..64),
        elapsed in 0u64..120,
    ) {
        let start = Instant::now();
        let mut store = LruStore::new(ttls.len());
        for (i, ttl) in ttls.iter().enumerate() {
            store.insert(format!("k{}", i), Bytes::new(), start + Duration::from_secs(*ttl), start);
        }

        let now = start + Duration::from_secs(elapsed);
        let expected = ttls.iter().filter(|ttl| elapsed > **ttl).count();

        prop_assert_eq!(store.clean_expired(now), expected);
        prop_assert_eq!(store.len(), ttls.len() - expected);
        prop_assert!(store.heap_is_consistent());
    }
}
