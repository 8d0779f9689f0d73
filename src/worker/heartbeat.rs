//! Block-report heartbeat.
//!
//! Every tick the worker scans its directory and POSTs the name list to the
//! master. This is also how a freshly restarted master relearns the whole
//! index, so the loop never gives up: a dead master just means the next tick
//! tries again.

use std::sync::Arc;

use crate::config::{WorkerConfig, CONTROL_TIMEOUT, HEARTBEAT_INTERVAL};
use super::store::BlobStore;

pub async fn run(blob_store: Arc<BlobStore>, client: reqwest::Client, config: WorkerConfig) {
    let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);

    loop {
        interval.tick().await;

        let files = match blob_store.list().await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!("block report scan failed: {}", e);
                continue;
            }
        };

        let result = client
            .post(format!("{}/register", config.master_url))
            .query(&[("addr", &config.my_addr)])
            .json(&files)
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("block report sent ({} blobs)", files.len());
            }
            Ok(resp) => {
                tracing::warn!("master answered block report with {}", resp.status());
            }
            Err(e) => {
                tracing::info!("waiting for master... ({})", e);
            }
        }
    }
}
