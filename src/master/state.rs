//! Coordinator state and its transitions.
//!
//! One owned value holds the four mutable indexes and the hash ring; the
//! [`MasterNode`](super::MasterNode) wraps it in a single readers–writer
//! lock. Every transition is a plain method taking an explicit `now`, which
//! keeps the handlers thin and lets tests drive the clock instead of
//! sleeping through liveness and tombstone windows.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::config::{LIVENESS_WINDOW, RESURRECTION_WINDOW, TOMBSTONE_RETENTION, VIRTUAL_NODES};
use crate::protocol::StatsResponse;
use crate::ring::HashRing;

pub struct MasterState {
    /// Worker address → last heartbeat.
    pub active_nodes: HashMap<String, Instant>,
    /// Blob name → addresses currently believed to hold it. Sets are never
    /// kept empty; an unreplicated blob simply has no entry.
    pub file_index: HashMap<String, HashSet<String>>,
    /// Blob name → 8-hex-digit CRC32. May be absent for blobs learned only
    /// from block reports until someone asks for the checksum.
    pub checksums: HashMap<String, String>,
    /// Blob name → deletion stamp. Suppresses resurrection within the
    /// resurrection window; swept after the retention period.
    pub tombstones: HashMap<String, Instant>,
    pub ring: HashRing,
}

/// One under-replicated blob the fixer should act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairJob {
    pub name: String,
    /// Any current holder, used as the copy source.
    pub source: String,
    /// Ring-preferred addresses that do not hold the blob yet.
    pub targets: Vec<String>,
}

impl MasterState {
    pub fn new() -> Self {
        Self {
            active_nodes: HashMap::new(),
            file_index: HashMap::new(),
            checksums: HashMap::new(),
            tombstones: HashMap::new(),
            ring: HashRing::new(VIRTUAL_NODES),
        }
    }

    /// Applies one worker heartbeat: refreshes membership, adds a first-time
    /// worker to the ring, and folds the block report into the file index.
    ///
    /// Returns the reported names that are tombstoned within the resurrection
    /// window. Those are *not* indexed; the caller owes each one a delete
    /// request to `addr`, issued outside the lock.
    pub fn apply_block_report(
        &mut self,
        addr: &str,
        names: Vec<String>,
        now: Instant,
    ) -> Vec<String> {
        if !self.active_nodes.contains_key(addr) {
            self.ring.add_node(addr);
            tracing::info!("worker {} joined, ring has {} nodes", addr, self.ring.physical_len());
        }
        self.active_nodes.insert(addr.to_string(), now);

        let mut suppressed = Vec::new();
        for name in names {
            if let Some(stamp) = self.tombstones.get(&name).copied() {
                if now.duration_since(stamp) < RESURRECTION_WINDOW {
                    suppressed.push(name);
                    continue;
                }
                self.tombstones.remove(&name);
            }
            self.file_index
                .entry(name)
                .or_default()
                .insert(addr.to_string());
        }
        suppressed
    }

    /// Expires workers whose last heartbeat is older than the liveness
    /// window: drops them from membership, scrubs their address out of every
    /// replica set (removing entries that become empty) and rebuilds the
    /// ring from the survivors. Returns the expired addresses.
    pub fn expire_stale(&mut self, now: Instant) -> Vec<String> {
        let stale: Vec<String> = self
            .active_nodes
            .iter()
            .filter(|(_, last)| now.duration_since(**last) > LIVENESS_WINDOW)
            .map(|(addr, _)| addr.clone())
            .collect();
        if stale.is_empty() {
            return stale;
        }

        for addr in &stale {
            self.active_nodes.remove(addr);
        }
        self.file_index.retain(|_, replicas| {
            for addr in &stale {
                replicas.remove(addr);
            }
            !replicas.is_empty()
        });
        self.rebuild_ring();
        stale
    }

    fn rebuild_ring(&mut self) {
        let mut ring = HashRing::new(VIRTUAL_NODES);
        for addr in self.active_nodes.keys() {
            ring.add_node(addr);
        }
        self.ring = ring;
    }

    /// Post-fanout bookkeeping for an upload: indexes every successful
    /// replica and records the acked checksum (last writer wins; honest
    /// replicas all report the same digest).
    pub fn record_upload(&mut self, name: &str, successes: &[(String, Option<String>)]) {
        if successes.is_empty() {
            return;
        }
        let replicas = self.file_index.entry(name.to_string()).or_default();
        for (addr, _) in successes {
            replicas.insert(addr.clone());
        }
        for (_, checksum) in successes {
            if let Some(checksum) = checksum {
                self.checksums.insert(name.to_string(), checksum.clone());
            }
        }
    }

    /// Post-fanout bookkeeping for a delete: stamps the tombstone as soon as
    /// one worker acked, removes acked addresses from the replica set, and
    /// drops the index and checksum entries once nothing holds the blob.
    /// Returns how many replicas are still believed to exist.
    pub fn apply_delete_acks(&mut self, name: &str, acked: &[String], now: Instant) -> usize {
        if !acked.is_empty() {
            self.tombstones.insert(name.to_string(), now);
        }

        let remaining = match self.file_index.get_mut(name) {
            Some(replicas) => {
                for addr in acked {
                    replicas.remove(addr);
                }
                replicas.len()
            }
            None => 0,
        };

        if remaining == 0 {
            self.file_index.remove(name);
            self.checksums.remove(name);
        }
        remaining
    }

    /// Drops tombstones past the retention period. Returns how many went.
    pub fn sweep_tombstones(&mut self, now: Instant) -> usize {
        let before = self.tombstones.len();
        self.tombstones
            .retain(|_, stamp| now.duration_since(*stamp) <= TOMBSTONE_RETENTION);
        before - self.tombstones.len()
    }

    /// Under-replicated blobs the fixer can act on. Requires at least two
    /// live workers (one source, one target); tombstoned names are skipped.
    pub fn repair_candidates(&self, replica_target: usize) -> Vec<RepairJob> {
        if self.active_nodes.len() < 2 {
            return Vec::new();
        }

        let mut jobs = Vec::new();
        for (name, holders) in &self.file_index {
            if holders.len() >= replica_target || self.tombstones.contains_key(name) {
                continue;
            }
            let source = match holders.iter().next() {
                Some(addr) => addr.clone(),
                None => continue,
            };
            let targets: Vec<String> = self
                .ring
                .nodes(name, replica_target)
                .into_iter()
                .filter(|addr| !holders.contains(addr))
                .collect();
            if !targets.is_empty() {
                jobs.push(RepairJob {
                    name: name.clone(),
                    source,
                    targets,
                });
            }
        }
        jobs
    }

    /// Replica snapshot for a read, most recently heartbeated first.
    pub fn download_candidates(&self, name: &str) -> Vec<String> {
        let holders = match self.file_index.get(name) {
            Some(holders) => holders,
            None => return Vec::new(),
        };
        let mut addrs: Vec<String> = holders.iter().cloned().collect();
        addrs.sort_by_key(|addr| std::cmp::Reverse(self.active_nodes.get(addr).copied()));
        addrs
    }

    pub fn stats(&self) -> StatsResponse {
        StatsResponse {
            active_nodes: self.active_nodes.len(),
            total_files: self.file_index.len(),
            total_checksums: self.checksums.len(),
            ring_size: self.ring.virtual_len(),
        }
    }

    /// Blobs with fewer replicas than `replica_target`, for metrics and the
    /// console.
    pub fn under_replicated(&self, replica_target: usize) -> usize {
        self.file_index
            .values()
            .filter(|replicas| replicas.len() < replica_target)
            .count()
    }

    /// Substring search over blob names; the value mirrors the replica map
    /// shape the console expects (`{name: {addr: true}}`).
    pub fn search(&self, query: &str) -> HashMap<String, HashMap<String, bool>> {
        self.file_index
            .iter()
            .filter(|(name, _)| name.contains(query))
            .map(|(name, replicas)| {
                let addrs = replicas.iter().map(|addr| (addr.clone(), true)).collect();
                (name.clone(), addrs)
            })
            .collect()
    }
}

impl Default for MasterState {
    fn default() -> Self {
        Self::new()
    }
}
