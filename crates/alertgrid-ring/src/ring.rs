use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

/// Virtual points inserted per node.
pub const DEFAULT_REPLICAS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingError {
    #[error("hash ring has no members")]
    Empty,
}

pub type RingResult<T> = Result<T, RingError>;

/// Consistent-hash ring over node addresses.
///
/// Points are CRC-32 (IEEE) hashes of `"{replica}{node}"`. A key belongs to
/// the first point at or after its own hash, wrapping around to the lowest
/// point.
#[derive(Debug, Clone)]
pub struct HashRing {
    replicas: usize,
    members: BTreeSet<String>,
    points: BTreeMap<u32, String>,
}

impl HashRing {
    pub fn new() -> Self {
        Self::with_replicas(DEFAULT_REPLICAS)
    }

    /// Create a ring with a custom number of virtual points per node.
    pub fn with_replicas(replicas: usize) -> Self {
        Self {
            replicas: replicas.max(1),
            members: BTreeSet::new(),
            points: BTreeMap::new(),
        }
    }

    /// Build a ring containing every node in `nodes`.
    pub fn from_nodes<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ring = Self::new();
        for node in nodes {
            ring.add(node);
        }
        ring
    }

    /// Insert a node and its virtual points. Re-adding a member is a no-op.
    pub fn add(&mut self, node: impl Into<String>) {
        let node = node.into();
        if !self.members.insert(node.clone()) {
            return;
        }
        self.insert_points(&node);
    }

    /// Remove a node and all of its virtual points.
    pub fn remove(&mut self, node: &str) -> bool {
        if !self.members.remove(node) {
            return false;
        }
        // A removed node may have shadowed a colliding point of another
        // member, so the points are recomputed from scratch.
        self.points.clear();
        let members: Vec<String> = self.members.iter().cloned().collect();
        for member in &members {
            self.insert_points(member);
        }
        true
    }

    /// Node owning `key`.
    pub fn get(&self, key: &str) -> RingResult<&str> {
        let hash = crc32fast::hash(key.as_bytes());
        self.points
            .range(hash..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, node)| node.as_str())
            .ok_or(RingError::Empty)
    }

    /// Members in sorted order.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }

    pub fn contains(&self, node: &str) -> bool {
        self.members.contains(node)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn insert_points(&mut self, node: &str) {
        for i in 0..self.replicas {
            let hash = crc32fast::hash(format!("{i}{node}").as_bytes());
            // Collisions go to the smaller name so lookups never depend on
            // insertion order.
            match self.points.get(&hash) {
                Some(existing) if existing.as_str() <= node => {}
                _ => {
                    self.points.insert(hash, node.to_string());
                }
            }
        }
    }
}

impl Default for HashRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("http://10.0.0.{i}:9092")).collect()
    }

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("loda_alarm_{i}")).collect()
    }

    #[test]
    fn empty_ring_errors() {
        let ring = HashRing::new();
        assert_eq!(ring.get("anything"), Err(RingError::Empty));
        assert!(ring.is_empty());
    }

    #[test]
    fn single_node_owns_everything() {
        let ring = HashRing::from_nodes(["http://a:9092"]);
        for key in keys(100) {
            assert_eq!(ring.get(&key).unwrap(), "http://a:9092");
        }
    }

    #[test]
    fn lookups_are_deterministic() {
        let ring = HashRing::from_nodes(nodes(3));
        for key in keys(500) {
            let first = ring.get(&key).unwrap().to_string();
            for _ in 0..3 {
                assert_eq!(ring.get(&key).unwrap(), first);
            }
        }
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let forward = HashRing::from_nodes(nodes(4));
        let mut reversed_nodes = nodes(4);
        reversed_nodes.reverse();
        let reversed = HashRing::from_nodes(reversed_nodes);

        for key in keys(1000) {
            assert_eq!(forward.get(&key), reversed.get(&key));
        }
    }

    #[test]
    fn adding_a_node_only_moves_keys_to_it() {
        let before = HashRing::from_nodes(nodes(3));
        let mut after = before.clone();
        let newcomer = "http://10.0.0.99:9092";
        after.add(newcomer);

        let keys = keys(10_000);
        let mut moved = 0;
        for key in &keys {
            let old = before.get(key).unwrap();
            let new = after.get(key).unwrap();
            if old != new {
                assert_eq!(new, newcomer, "key {key} moved between old nodes");
                moved += 1;
            }
        }

        let fraction = moved as f64 / keys.len() as f64;
        assert!(moved > 0);
        assert!(fraction < 0.4, "moved fraction {fraction} too high");
    }

    #[test]
    fn removing_a_node_restores_previous_mapping() {
        let base = HashRing::from_nodes(nodes(3));
        let mut ring = base.clone();
        ring.add("http://10.0.0.99:9092");
        assert!(ring.remove("http://10.0.0.99:9092"));
        assert!(!ring.remove("http://10.0.0.99:9092"));

        for key in keys(1000) {
            assert_eq!(ring.get(&key), base.get(&key));
        }
    }

    #[test]
    fn re_adding_member_is_noop() {
        let mut ring = HashRing::from_nodes(nodes(2));
        let points = ring.points.len();
        ring.add(nodes(2)[0].clone());
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.points.len(), points);
    }

    #[test]
    fn keys_past_the_last_point_wrap_to_the_first() {
        let ring = HashRing::from_nodes(nodes(2));
        let (&last, _) = ring.points.iter().next_back().unwrap();
        let (_, first_owner) = ring.points.iter().next().unwrap();

        let key = (0..1_000_000)
            .map(|i| format!("wrap-{i}"))
            .find(|k| crc32fast::hash(k.as_bytes()) > last)
            .expect("some key hashes past the last point");

        assert_eq!(ring.get(&key).unwrap(), first_owner);
    }

    #[test]
    fn members_are_sorted() {
        let ring = HashRing::from_nodes(["http://b", "http://a"]);
        let members: Vec<&str> = ring.members().collect();
        assert_eq!(members, vec!["http://a", "http://b"]);
        assert!(ring.contains("http://a"));
    }
}
