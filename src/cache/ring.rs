//! Consistent Hash Ring
//!
//! Maps cache keys to owning nodes. Each node is scattered over the 32-bit
//! hash space as `replicas` virtual points; a key belongs to the first point
//! at or after its own hash, wrapping around to the lowest point.
//!
//! The hash function is a plain function value chosen at construction
//! (CRC-32/IEEE by default).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use parking_lot::RwLock;

/// Hash function used for both keys and virtual points
pub type HashFn = fn(&[u8]) -> u32;

/// Default number of virtual points per node
pub const DEFAULT_REPLICAS: usize = 100;

/// CRC-32 (IEEE polynomial) hash
#[inline]
pub fn crc32_ieee(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// A single virtual point on the ring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingPoint {
    /// Position in hash space
    pub hash: u32,
    /// Owning node
    pub node: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct RingState {
    /// Ordered by hash; a later add overwrites a colliding point
    points: BTreeMap<u32, String>,
    nodes: BTreeSet<String>,
}

/// Consistent hash ring with virtual replicas
pub struct HashRing {
    hasher: HashFn,
    replicas: usize,
    state: RwLock<RingState>,
}

impl HashRing {
    /// Create a ring using CRC-32
    pub fn new(replicas: usize) -> Self {
        Self::with_hasher(replicas, crc32_ieee)
    }

    /// Create a ring with a custom hash function
    pub fn with_hasher(replicas: usize, hasher: HashFn) -> Self {
        Self {
            hasher,
            replicas,
            state: RwLock::new(RingState::default()),
        }
    }

    /// Virtual points per node
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Add a node. Returns false if it was already present.
    pub fn add(&self, node: &str) -> bool {
        let mut state = self.state.write();
        if !state.nodes.insert(node.to_string()) {
            return false;
        }
        for replica in 0..self.replicas {
            let hash = (self.hasher)(Self::point_label(node, replica).as_bytes());
            state.points.insert(hash, node.to_string());
        }
        true
    }

    /// Remove a node and every point it owns. Returns false if absent.
    ///
    /// Keys the node owned fall through to the next point on the ring; the
    /// ring itself moves no data.
    pub fn remove(&self, node: &str) -> bool {
        let mut state = self.state.write();
        if !state.nodes.remove(node) {
            return false;
        }
        state.points.retain(|_, owner| owner != node);
        true
    }

    /// Owning node for a key, or `None` when the ring has no points
    pub fn get(&self, key: &str) -> Option<String> {
        let state = self.state.read();
        if state.points.is_empty() {
            return None;
        }
        let hash = (self.hasher)(key.as_bytes());
        state
            .points
            .range(hash..)
            .next()
            .or_else(|| state.points.iter().next())
            .map(|(_, node)| node.clone())
    }

    /// Check if a node is a member
    pub fn contains(&self, node: &str) -> bool {
        self.state.read().nodes.contains(node)
    }

    /// Member nodes in sorted order
    pub fn nodes(&self) -> Vec<String> {
        self.state.read().nodes.iter().cloned().collect()
    }

    /// Number of member nodes
    pub fn len(&self) -> usize {
        self.state.read().nodes.len()
    }

    /// Check if the ring has no members
    pub fn is_empty(&self) -> bool {
        self.state.read().nodes.is_empty()
    }

    /// Number of virtual points currently on the ring
    pub fn point_count(&self) -> usize {
        self.state.read().points.len()
    }

    /// All points in hash order
    pub fn points(&self) -> Vec<RingPoint> {
        self.state
            .read()
            .points
            .iter()
            .map(|(hash, node)| RingPoint {
                hash: *hash,
                node: node.clone(),
            })
            .collect()
    }

    #[inline]
    fn point_label(node: &str, replica: usize) -> String {
        format!("{}-{}", node, replica)
    }
}

impl fmt::Debug for HashRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("HashRing")
            .field("replicas", &self.replicas)
            .field("nodes", &state.nodes)
            .field("points", &state.points.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Hashes to the leading decimal digits of the input, so point and key
    /// positions can be chosen by hand.
    fn leading_number(data: &[u8]) -> u32 {
        data.iter()
            .take_while(|b| b.is_ascii_digit())
            .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'))
    }

    #[test]
    fn test_empty_ring_has_no_owner() {
        let ring = HashRing::new(DEFAULT_REPLICAS);
        assert!(ring.is_empty());
        assert_eq!(ring.get("anything"), None);
    }

    #[test]
    fn test_lookup_picks_next_point_and_wraps() {
        let ring = HashRing::with_hasher(1, leading_number);
        ring.add("100");
        ring.add("200");
        ring.add("300");

        assert_eq!(ring.get("50").as_deref(), Some("100"));
        assert_eq!(ring.get("100").as_deref(), Some("100"));
        assert_eq!(ring.get("150").as_deref(), Some("200"));
        assert_eq!(ring.get("300").as_deref(), Some("300"));
        assert_eq!(ring.get("301").as_deref(), Some("100"));
    }

    #[test]
    fn test_remove_rehomes_lookup_to_successor() {
        let ring = HashRing::with_hasher(1, leading_number);
        ring.add("100");
        ring.add("200");

        assert_eq!(ring.get("150").as_deref(), Some("200"));
        assert!(ring.remove("200"));
        assert_eq!(ring.get("150").as_deref(), Some("100"));
    }

    #[test]
    fn test_collision_last_add_wins() {
        // Both nodes hash every replica to 0
        let ring = HashRing::with_hasher(3, |_| 0);
        ring.add("first");
        ring.add("second");

        assert_eq!(ring.point_count(), 1);
        assert_eq!(ring.get("k").as_deref(), Some("second"));
    }

    #[test]
    fn test_add_generates_replica_points() {
        let ring = HashRing::new(DEFAULT_REPLICAS);
        ring.add("node-a");
        assert_eq!(ring.point_count(), DEFAULT_REPLICAS);

        let points = ring.points();
        assert!(points.windows(2).all(|w| w[0].hash < w[1].hash));
        assert!(points.iter().all(|p| p.node == "node-a"));
    }

    #[test]
    fn test_add_and_remove_are_idempotent() {
        let ring = HashRing::new(DEFAULT_REPLICAS);
        assert!(ring.add("n1"));
        let once = ring.points();
        assert!(!ring.add("n1"));
        assert_eq!(ring.points(), once);

        assert!(ring.remove("n1"));
        assert!(!ring.remove("n1"));
        assert_eq!(ring.point_count(), 0);
        assert!(!ring.remove("never-added"));
    }

    #[test]
    fn test_lookup_is_deterministic() {
        let ring = HashRing::new(DEFAULT_REPLICAS);
        for node in ["N1", "N2", "N3"] {
            ring.add(node);
        }

        for i in 0..1000 {
            let key = format!("key-{}", i);
            assert_eq!(ring.get(&key), ring.get(&key));
        }
    }

    #[test]
    fn test_distribution_uses_every_node() {
        let ring = HashRing::new(DEFAULT_REPLICAS);
        for node in ["N1", "N2", "N3"] {
            ring.add(node);
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        for i in 0..3000 {
            let owner = ring.get(&format!("key-{}", i)).unwrap();
            *counts.entry(owner).or_default() += 1;
        }

        assert_eq!(counts.len(), 3);
        assert!(
            counts.values().all(|c| *c > 300),
            "Uneven distribution: {:?}",
            counts
        );
    }

    #[test]
    fn test_adding_node_moves_only_a_fraction_of_keys() {
        let ring = HashRing::new(DEFAULT_REPLICAS);
        for node in ["N1", "N2", "N3"] {
            ring.add(node);
        }
        let keys: Vec<String> = (0..2000).map(|i| format!("key-{}", i)).collect();
        let before: Vec<Option<String>> = keys.iter().map(|k| ring.get(k)).collect();

        ring.add("N4");

        let moved = keys
            .iter()
            .zip(&before)
            .filter(|(k, owner)| ring.get(k) != **owner)
            .count();
        // Ideal is 1/4 of keys; every moved key must now belong to N4
        assert!(moved < keys.len() / 2, "moved {} of {}", moved, keys.len());
        for (key, owner) in keys.iter().zip(&before) {
            let now = ring.get(key);
            if now != *owner {
                assert_eq!(now.as_deref(), Some("N4"));
            }
        }
    }
}
