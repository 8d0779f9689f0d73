//! Consistent-hash ring.
//!
//! Responsible for mapping blob names to an ordered list of distinct worker
//! addresses. It ensures a deterministic placement for a fixed membership.
//!
//! ## Mechanism
//! - **Hashing**: Both ring positions and lookup keys are hashed with
//!   CRC32/IEEE. Each physical worker contributes `virtual_nodes` positions,
//!   hashed as `crc32("<i><address>")`, which smooths the distribution.
//! - **Lookup**: A key is hashed, the first position with hash ≥ key hash is
//!   found by binary search, and the walk proceeds clockwise (wrapping at the
//!   end) collecting distinct physical addresses.
//!
//! Membership changes do not mutate a ring in place; the caller rebuilds a
//! fresh ring from the surviving address set.

use std::collections::HashSet;

pub struct HashRing {
    /// (hash, address) pairs, sorted by hash.
    entries: Vec<(u32, String)>,
    /// Distinct physical addresses. Bounds the lookup walk, so CRC32
    /// collisions between (i, address) pairs cannot shrink the result.
    members: HashSet<String>,
    virtual_nodes: usize,
}

impl HashRing {
    pub fn new(virtual_nodes: usize) -> Self {
        Self {
            entries: Vec::new(),
            members: HashSet::new(),
            virtual_nodes: virtual_nodes.max(1),
        }
    }

    /// Inserts the virtual positions for one physical address and keeps the
    /// ring sorted. Re-adding a known address is a no-op.
    pub fn add_node(&mut self, addr: &str) {
        if !self.members.insert(addr.to_string()) {
            return;
        }
        for i in 0..self.virtual_nodes {
            let hash = crc32fast::hash(format!("{}{}", i, addr).as_bytes());
            self.entries.push((hash, addr.to_string()));
        }
        self.entries
            .sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    }

    /// Ordered replica preference for `key`: up to `count` distinct physical
    /// addresses, clockwise from the key's ring position.
    ///
    /// Deterministic for a fixed membership. Returns fewer than `count`
    /// addresses only when the ring holds fewer physical members.
    pub fn nodes(&self, key: &str, count: usize) -> Vec<String> {
        let want = count.min(self.members.len());
        if want == 0 {
            return Vec::new();
        }

        let hash = crc32fast::hash(key.as_bytes());
        let mut idx = self.entries.partition_point(|(h, _)| *h < hash);

        let mut picked = Vec::with_capacity(want);
        let mut seen: HashSet<&str> = HashSet::new();
        while picked.len() < want {
            if idx == self.entries.len() {
                idx = 0;
            }
            let addr = self.entries[idx].1.as_str();
            if seen.insert(addr) {
                picked.push(addr.to_string());
            }
            idx += 1;
        }
        picked
    }

    /// Number of virtual positions (what `/stats` reports as `ring_size`).
    pub fn virtual_len(&self) -> usize {
        self.entries.len()
    }

    /// Number of physical addresses on the ring.
    pub fn physical_len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_of(addrs: &[&str]) -> HashRing {
        let mut ring = HashRing::new(10);
        for addr in addrs {
            ring.add_node(addr);
        }
        ring
    }

    #[test]
    fn lookup_is_deterministic() {
        let ring = ring_of(&["http://w1:8081", "http://w2:8082", "http://w3:8083"]);
        let first = ring.nodes("a.mp4", 2);
        for _ in 0..10 {
            assert_eq!(ring.nodes("a.mp4", 2), first);
        }
    }

    #[test]
    fn lookup_returns_distinct_addresses() {
        let ring = ring_of(&["http://w1:8081", "http://w2:8082", "http://w3:8083"]);
        for key in ["a.mp4", "b.mkv", "c.avi", "d.mov", "e.webm"] {
            let picked = ring.nodes(key, 3);
            assert_eq!(picked.len(), 3);
            let distinct: HashSet<_> = picked.iter().collect();
            assert_eq!(distinct.len(), 3, "duplicates for key {}", key);
        }
    }

    #[test]
    fn empty_ring_yields_nothing() {
        let ring = HashRing::new(10);
        assert!(ring.nodes("a.mp4", 2).is_empty());
        assert!(ring.is_empty());
    }

    #[test]
    fn single_member_caps_the_result() {
        let ring = ring_of(&["http://w1:8081"]);
        let picked = ring.nodes("a.mp4", 2);
        assert_eq!(picked, vec!["http://w1:8081".to_string()]);
    }

    #[test]
    fn count_is_capped_by_membership() {
        let ring = ring_of(&["http://w1:8081", "http://w2:8082"]);
        assert_eq!(ring.nodes("a.mp4", 5).len(), 2);
    }

    #[test]
    fn each_member_contributes_virtual_positions() {
        let ring = ring_of(&["http://w1:8081", "http://w2:8082"]);
        assert_eq!(ring.virtual_len(), 20);
        assert_eq!(ring.physical_len(), 2);
    }

    #[test]
    fn re_adding_an_address_is_a_noop() {
        let mut ring = ring_of(&["http://w1:8081"]);
        ring.add_node("http://w1:8081");
        assert_eq!(ring.virtual_len(), 10);
    }

    #[test]
    fn rebuilding_from_the_same_set_preserves_placement() {
        let addrs = ["http://w1:8081", "http://w2:8082", "http://w3:8083"];
        let a = ring_of(&addrs);
        let b = ring_of(&["http://w3:8083", "http://w1:8081", "http://w2:8082"]);
        for key in ["a.mp4", "b.mkv", "c.avi"] {
            assert_eq!(a.nodes(key, 2), b.nodes(key, 2));
        }
    }

    #[test]
    fn keys_spread_across_members() {
        let ring = ring_of(&["http://w1:8081", "http://w2:8082", "http://w3:8083"]);
        let mut primaries: HashSet<String> = HashSet::new();
        for i in 0..200 {
            let key = format!("movie_{}.mp4", i);
            primaries.insert(ring.nodes(&key, 1)[0].clone());
        }
        assert_eq!(primaries.len(), 3, "every member should own some keys");
    }
}
