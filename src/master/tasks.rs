//! Background loops: liveness, tombstone GC and replica repair.
//!
//! Every loop follows the same shape as the request handlers: take the lock
//! briefly to snapshot or mutate, never across network I/O.

use std::sync::Arc;
use std::time::Instant;

use reqwest::multipart::{Form, Part};

use super::{net, MasterNode};
use crate::config::{
    CONTROL_TIMEOUT, FIXER_INTERVAL, HEALTH_CHECK_INTERVAL, PURGE_DELAY,
    TOMBSTONE_SWEEP_INTERVAL, TRANSFER_TIMEOUT,
};
use crate::protocol::FIELD_FILE;

pub fn spawn_background_loops(master: Arc<MasterNode>) {
    tokio::spawn(health_loop(master.clone()));
    tokio::spawn(tombstone_loop(master.clone()));

    if master.config.enable_fixer {
        tracing::info!("replication fixer enabled");
        tokio::spawn(fixer_loop(master));
    } else {
        tracing::info!("replication fixer disabled");
    }
}

async fn health_loop(master: Arc<MasterNode>) {
    let mut interval = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        let expired = {
            let mut state = master.state.write().await;
            state.expire_stale(Instant::now())
        };
        for addr in expired {
            tracing::warn!("worker {} missed the liveness window, dropped from membership", addr);
        }
    }
}

async fn tombstone_loop(master: Arc<MasterNode>) {
    let mut interval = tokio::time::interval(TOMBSTONE_SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let swept = {
            let mut state = master.state.write().await;
            state.sweep_tombstones(Instant::now())
        };
        if swept > 0 {
            tracing::info!("swept {} expired tombstones", swept);
        }
    }
}

/// Re-replicates under-replicated blobs by pulling from a current holder and
/// streaming into a ring-preferred target. The index is never touched here;
/// the new copy shows up in the target's next block report.
async fn fixer_loop(master: Arc<MasterNode>) {
    let mut interval = tokio::time::interval(FIXER_INTERVAL);
    loop {
        interval.tick().await;
        let jobs = {
            let state = master.state.read().await;
            state.repair_candidates(master.config.replicas)
        };
        for job in jobs {
            for target in job.targets {
                tracing::info!("re-replicating {}: {} -> {}", job.name, job.source, target);
                tokio::spawn(replicate_blob(
                    master.client.clone(),
                    job.name.clone(),
                    job.source.clone(),
                    target,
                ));
            }
        }
    }
}

async fn replicate_blob(client: reqwest::Client, name: String, source: String, target: String) {
    if let Err(e) = try_replicate(&client, &name, &source, &target).await {
        tracing::warn!(
            "re-replication failed for {}: {} -> {}: {}",
            name,
            source,
            target,
            e
        );
    }
}

async fn try_replicate(
    client: &reqwest::Client,
    name: &str,
    source: &str,
    target: &str,
) -> anyhow::Result<()> {
    let resp = client
        .get(format!("{}/download", source))
        .query(&[("name", name)])
        .timeout(TRANSFER_TIMEOUT)
        .send()
        .await?;
    if !resp.status().is_success() {
        anyhow::bail!("source answered {}", resp.status());
    }

    let part = Part::stream(reqwest::Body::wrap_stream(resp.bytes_stream()))
        .file_name(name.to_string());
    let form = Form::new().part(FIELD_FILE, part);

    let resp = client
        .post(format!("{}/upload", target))
        .query(&[("name", name)])
        .multipart(form)
        .timeout(TRANSFER_TIMEOUT)
        .send()
        .await?;
    if !resp.status().is_success() {
        anyhow::bail!("target answered {}", resp.status());
    }
    Ok(())
}

/// Tombstone enforcement: a restarted worker re-reported a deleted blob, so
/// tell it to drop its copy. Runs detached from the register handler.
pub async fn purge_resurrected(client: reqwest::Client, addr: String, name: String) {
    tokio::time::sleep(PURGE_DELAY).await;
    match net::get_with_retry(
        &client,
        &format!("{}/delete", addr),
        &[("name", name.as_str())],
        CONTROL_TIMEOUT,
        3,
    )
    .await
    {
        Ok(resp) if resp.status().is_success() => {
            tracing::info!("tombstone purge: removed resurrected {} from {}", name, addr);
        }
        Ok(resp) => tracing::warn!(
            "tombstone purge of {} on {} answered {}",
            name,
            addr,
            resp.status()
        ),
        Err(e) => tracing::warn!("tombstone purge of {} on {} failed: {}", name, addr, e),
    }
}
