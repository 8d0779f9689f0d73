//! Process configuration.
//!
//! Everything is driven by environment variables with code defaults, so a
//! cluster can be brought up with nothing but a couple of `--port` flags.
//! Timing constants live here too; they define the protocol's rhythm and are
//! referenced from both the master loops and the worker heartbeat.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Fallback admin token; override with `MDFS_ADMIN_SECRET` in any real deployment.
pub const DEFAULT_ADMIN_SECRET: &str = "admin888";

/// Virtual ring positions contributed by each physical worker.
pub const VIRTUAL_NODES: usize = 10;

/// How often a worker sends its block report.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// How often the master scans for stale workers.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);
/// A worker whose last heartbeat is older than this is considered dead.
pub const LIVENESS_WINDOW: Duration = Duration::from_secs(15);

/// While a tombstone is younger than this, re-reported copies are deleted.
pub const RESURRECTION_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
/// Tombstones older than this are garbage-collected.
pub const TOMBSTONE_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);
/// How often the tombstone sweep runs.
pub const TOMBSTONE_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// How often the replication fixer looks for under-replicated blobs.
pub const FIXER_INTERVAL: Duration = Duration::from_secs(10);
/// Grace delay before deleting a resurrected copy off a restarted worker.
pub const PURGE_DELAY: Duration = Duration::from_secs(1);

/// Timeout for small control requests (register, delete, verify, checksum).
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for whole-blob transfers.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);

const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub bind: SocketAddr,
    pub admin_secret: String,
    pub replicas: usize,
    pub enable_fixer: bool,
    pub max_body_bytes: usize,
    pub allowed_extensions: Vec<String>,
}

impl MasterConfig {
    pub fn from_env() -> Self {
        let bind = std::env::var("MDFS_BIND")
            .ok()
            .and_then(|value| value.parse::<SocketAddr>().ok())
            .unwrap_or_else(|| "0.0.0.0:8080".parse().expect("static default address"));

        let admin_secret =
            std::env::var("MDFS_ADMIN_SECRET").unwrap_or_else(|_| DEFAULT_ADMIN_SECRET.to_string());

        let replicas = std::env::var("MDFS_REPLICAS")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|n| *n >= 1)
            .unwrap_or(2);

        let enable_fixer = std::env::var("MDFS_ENABLE_FIXER")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let max_body_bytes = std::env::var("MAX_BODY_BYTES")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);

        let allowed_extensions = std::env::var("MDFS_ALLOWED_EXTENSIONS")
            .map(|value| {
                value
                    .split(',')
                    .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                    .filter(|ext| !ext.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| {
                crate::mime::ALLOWED_EXTENSIONS
                    .iter()
                    .map(|ext| ext.to_string())
                    .collect()
            });

        Self {
            bind,
            admin_secret,
            replicas,
            enable_fixer,
            max_body_bytes,
            allowed_extensions,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub my_addr: String,
    pub master_url: String,
    pub max_body_bytes: usize,
}

impl WorkerConfig {
    pub fn from_env(port: u16) -> Self {
        let my_addr =
            std::env::var("MY_ADDR").unwrap_or_else(|_| format!("http://localhost:{}", port));
        let master_url =
            std::env::var("MASTER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
        let max_body_bytes = std::env::var("MAX_BODY_BYTES")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);

        Self {
            port,
            data_dir: PathBuf::from(format!("./data_{}", port)),
            my_addr,
            master_url,
            max_body_bytes,
        }
    }
}
