//! Coordinator Module
//!
//! The master accepts client traffic, tracks which workers are alive and
//! which worker holds which blob, and drives replication. It is fully
//! stateless across restarts: workers re-announce their holdings with every
//! heartbeat, so the in-memory indexes reconverge within a few block reports.
//!
//! ## Core Mechanisms
//! - **Single state value**: All mutable coordinator state lives in one
//!   [`state::MasterState`] behind a single readers–writer lock. Handlers and
//!   background loops snapshot under the lock, perform network I/O outside
//!   it, and re-lock to apply results.
//! - **Heartbeat-driven membership**: Workers register every few seconds with
//!   a block report; a background checker expires anything silent for longer
//!   than the liveness window and rebuilds the hash ring from the survivors.
//! - **Tombstones**: Deletions are remembered for long enough that a worker
//!   restarting with a stale disk cannot resurrect a deleted blob.

pub mod console;
pub mod handlers;
pub mod net;
pub mod state;
pub mod tasks;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::MasterConfig;
use state::MasterState;

/// Everything a master handler needs: the shared state, the outbound HTTP
/// client and the static configuration.
pub struct MasterNode {
    pub state: RwLock<MasterState>,
    pub client: reqwest::Client,
    pub config: MasterConfig,
}

impl MasterNode {
    pub fn new(config: MasterConfig) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(MasterState::new()),
            client: reqwest::Client::new(),
            config,
        })
    }
}
