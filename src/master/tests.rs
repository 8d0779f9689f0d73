use std::time::{Duration, Instant};

use super::state::MasterState;
use crate::config::{LIVENESS_WINDOW, RESURRECTION_WINDOW, TOMBSTONE_RETENTION, VIRTUAL_NODES};

const W1: &str = "http://w1:8081";
const W2: &str = "http://w2:8082";
const W3: &str = "http://w3:8083";

fn report(state: &mut MasterState, addr: &str, names: &[&str], now: Instant) -> Vec<String> {
    state.apply_block_report(addr, names.iter().map(|n| n.to_string()).collect(), now)
}

// ============================================================
// REGISTRATION / BLOCK REPORTS
// ============================================================

#[test]
fn block_report_registers_worker_and_files() {
    let mut state = MasterState::new();
    let now = Instant::now();

    let suppressed = report(&mut state, W1, &["a.mp4", "b.mkv"], now);
    assert!(suppressed.is_empty());

    assert!(state.active_nodes.contains_key(W1));
    assert_eq!(state.ring.physical_len(), 1);
    assert_eq!(state.ring.virtual_len(), VIRTUAL_NODES);
    assert!(state.file_index["a.mp4"].contains(W1));
    assert!(state.file_index["b.mkv"].contains(W1));
}

#[test]
fn every_indexed_address_is_an_active_node() {
    let mut state = MasterState::new();
    let now = Instant::now();
    report(&mut state, W1, &["a.mp4"], now);
    report(&mut state, W2, &["a.mp4", "b.mkv"], now);

    for replicas in state.file_index.values() {
        for addr in replicas {
            assert!(state.active_nodes.contains_key(addr));
        }
    }
}

#[test]
fn repeated_heartbeats_do_not_grow_the_ring() {
    let mut state = MasterState::new();
    let t0 = Instant::now();
    report(&mut state, W1, &[], t0);
    report(&mut state, W1, &[], t0 + Duration::from_secs(5));
    report(&mut state, W1, &[], t0 + Duration::from_secs(10));

    assert_eq!(state.ring.virtual_len(), VIRTUAL_NODES);
    assert_eq!(state.active_nodes[W1], t0 + Duration::from_secs(10));
}

// ============================================================
// TOMBSTONES
// ============================================================

#[test]
fn tombstone_suppresses_resurrection_within_window() {
    let mut state = MasterState::new();
    let t0 = Instant::now();
    report(&mut state, W1, &["a.mp4"], t0);
    state.apply_delete_acks("a.mp4", &[W1.to_string()], t0);
    assert!(!state.file_index.contains_key("a.mp4"));

    // A worker restarting with a stale disk re-reports the blob.
    let later = t0 + Duration::from_secs(60);
    let suppressed = report(&mut state, W2, &["a.mp4"], later);

    assert_eq!(suppressed, vec!["a.mp4".to_string()]);
    assert!(!state.file_index.contains_key("a.mp4"));
    assert!(state.tombstones.contains_key("a.mp4"));
}

#[test]
fn tombstone_expires_after_the_resurrection_window() {
    let mut state = MasterState::new();
    let t0 = Instant::now();
    report(&mut state, W1, &["a.mp4"], t0);
    state.apply_delete_acks("a.mp4", &[W1.to_string()], t0);

    let later = t0 + RESURRECTION_WINDOW + Duration::from_secs(1);
    let suppressed = report(&mut state, W2, &["a.mp4"], later);

    assert!(suppressed.is_empty());
    assert!(state.file_index["a.mp4"].contains(W2));
    assert!(!state.tombstones.contains_key("a.mp4"));
}

#[test]
fn sweep_drops_only_old_tombstones() {
    let mut state = MasterState::new();
    let t0 = Instant::now();
    state.tombstones.insert("old.mp4".to_string(), t0);
    state
        .tombstones
        .insert("fresh.mp4".to_string(), t0 + TOMBSTONE_RETENTION);

    let swept = state.sweep_tombstones(t0 + TOMBSTONE_RETENTION + Duration::from_secs(1));

    assert_eq!(swept, 1);
    assert!(!state.tombstones.contains_key("old.mp4"));
    assert!(state.tombstones.contains_key("fresh.mp4"));
}

// ============================================================
// LIVENESS
// ============================================================

#[test]
fn stale_worker_is_expired_and_scrubbed() {
    let mut state = MasterState::new();
    let t0 = Instant::now();
    report(&mut state, W1, &["a.mp4"], t0);
    report(&mut state, W2, &["a.mp4", "b.mkv"], t0);

    // W2 keeps heartbeating, W1 goes silent.
    let t1 = t0 + LIVENESS_WINDOW + Duration::from_secs(1);
    report(&mut state, W2, &["a.mp4", "b.mkv"], t1);
    let expired = state.expire_stale(t1);

    assert_eq!(expired, vec![W1.to_string()]);
    assert!(!state.active_nodes.contains_key(W1));
    assert!(!state.file_index["a.mp4"].contains(W1));
    assert!(state.file_index["a.mp4"].contains(W2));
    assert_eq!(state.ring.physical_len(), 1);
}

#[test]
fn scrub_removes_index_entries_that_became_empty() {
    let mut state = MasterState::new();
    let t0 = Instant::now();
    report(&mut state, W1, &["only-here.mp4"], t0);

    state.expire_stale(t0 + LIVENESS_WINDOW + Duration::from_secs(1));

    assert!(!state.file_index.contains_key("only-here.mp4"));
    assert!(state.ring.is_empty());
}

// ============================================================
// UPLOAD / DELETE BOOKKEEPING
// ============================================================

#[test]
fn upload_bookkeeping_records_replicas_and_checksum() {
    let mut state = MasterState::new();
    state.record_upload(
        "a.mp4",
        &[
            (W1.to_string(), Some("b6cc4292".to_string())),
            (W2.to_string(), None),
        ],
    );

    assert!(state.file_index["a.mp4"].contains(W1));
    assert!(state.file_index["a.mp4"].contains(W2));
    assert_eq!(state.checksums["a.mp4"], "b6cc4292");
}

#[test]
fn failed_upload_records_nothing() {
    let mut state = MasterState::new();
    state.record_upload("a.mp4", &[]);
    assert!(!state.file_index.contains_key("a.mp4"));
}

#[test]
fn full_delete_drops_entry_checksum_and_stamps_tombstone() {
    let mut state = MasterState::new();
    let now = Instant::now();
    report(&mut state, W1, &["a.mp4"], now);
    report(&mut state, W2, &["a.mp4"], now);
    state.checksums.insert("a.mp4".to_string(), "b6cc4292".to_string());

    let remaining =
        state.apply_delete_acks("a.mp4", &[W1.to_string(), W2.to_string()], now);

    assert_eq!(remaining, 0);
    assert!(!state.file_index.contains_key("a.mp4"));
    assert!(!state.checksums.contains_key("a.mp4"));
    assert!(state.tombstones.contains_key("a.mp4"));
}

#[test]
fn partial_delete_keeps_the_unacked_replica() {
    let mut state = MasterState::new();
    let now = Instant::now();
    report(&mut state, W1, &["a.mp4"], now);
    report(&mut state, W2, &["a.mp4"], now);
    state.checksums.insert("a.mp4".to_string(), "b6cc4292".to_string());

    let remaining = state.apply_delete_acks("a.mp4", &[W1.to_string()], now);

    assert_eq!(remaining, 1);
    assert!(state.file_index["a.mp4"].contains(W2));
    assert!(state.checksums.contains_key("a.mp4"));
    assert!(state.tombstones.contains_key("a.mp4"));
}

#[test]
fn unacked_delete_leaves_no_tombstone() {
    let mut state = MasterState::new();
    let now = Instant::now();
    report(&mut state, W1, &["a.mp4"], now);

    let remaining = state.apply_delete_acks("a.mp4", &[], now);

    assert_eq!(remaining, 1);
    assert!(!state.tombstones.contains_key("a.mp4"));
    assert!(state.file_index.contains_key("a.mp4"));
}

// ============================================================
// REPAIR / READ CANDIDATES
// ============================================================

#[test]
fn repair_needs_at_least_two_workers() {
    let mut state = MasterState::new();
    let now = Instant::now();
    report(&mut state, W1, &["a.mp4"], now);

    assert!(state.repair_candidates(2).is_empty());
}

#[test]
fn repair_targets_under_replicated_blobs_only() {
    let mut state = MasterState::new();
    let now = Instant::now();
    report(&mut state, W1, &["lonely.mp4", "healthy.mp4"], now);
    report(&mut state, W2, &["healthy.mp4"], now);
    report(&mut state, W3, &[], now);

    let jobs = state.repair_candidates(2);

    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.name, "lonely.mp4");
    assert_eq!(job.source, W1);
    assert!(!job.targets.is_empty());
    assert!(!job.targets.contains(&W1.to_string()));
}

#[test]
fn repair_skips_tombstoned_blobs() {
    let mut state = MasterState::new();
    let now = Instant::now();
    report(&mut state, W1, &["doomed.mp4"], now);
    report(&mut state, W2, &[], now);
    state.tombstones.insert("doomed.mp4".to_string(), now);

    assert!(state.repair_candidates(2).is_empty());
}

#[test]
fn download_candidates_prefer_recent_heartbeats() {
    let mut state = MasterState::new();
    let t0 = Instant::now();
    report(&mut state, W1, &["a.mp4"], t0);
    report(&mut state, W2, &["a.mp4"], t0 + Duration::from_secs(3));

    let candidates = state.download_candidates("a.mp4");
    assert_eq!(candidates, vec![W2.to_string(), W1.to_string()]);

    assert!(state.download_candidates("missing.mp4").is_empty());
}

// ============================================================
// STATS / SEARCH
// ============================================================

#[test]
fn stats_reflect_the_indexes() {
    let mut state = MasterState::new();
    let now = Instant::now();
    report(&mut state, W1, &["a.mp4"], now);
    report(&mut state, W2, &["a.mp4", "b.mkv"], now);
    state.checksums.insert("a.mp4".to_string(), "b6cc4292".to_string());

    let stats = state.stats();
    assert_eq!(stats.active_nodes, 2);
    assert_eq!(stats.total_files, 2);
    assert_eq!(stats.total_checksums, 1);
    assert_eq!(stats.ring_size, 2 * VIRTUAL_NODES);

    assert_eq!(state.under_replicated(2), 1);
}

#[test]
fn search_matches_substrings() {
    let mut state = MasterState::new();
    let now = Instant::now();
    report(&mut state, W1, &["holiday.mp4", "holiday.mkv", "work.avi"], now);

    let matches = state.search("holiday");
    assert_eq!(matches.len(), 2);
    assert_eq!(matches["holiday.mp4"][W1], true);

    assert_eq!(state.search("").len(), 3);
    assert!(state.search("nothing").is_empty());
}
