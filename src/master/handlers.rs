//! Master HTTP handlers.
//!
//! These translate client and worker requests into state transitions and
//! worker fan-outs. Handlers snapshot what they need under the shared lock,
//! do all network I/O with the lock released, and re-lock only to apply the
//! results.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Extension, Multipart, Query};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::task::JoinSet;

use super::{net, tasks, MasterNode};
use crate::config::{CONTROL_TIMEOUT, TRANSFER_TIMEOUT};
use crate::mime;
use crate::protocol::{
    VerifyEntry, CHECKSUM_ERROR, CHECKSUM_UNKNOWN, DELETE_ACK, FIELD_FILE, FIELD_MOVIE,
    FIELD_SECRET, MISMATCH_PREFIX, OK_PREFIX,
};

#[derive(Deserialize)]
pub struct RegisterParams {
    pub addr: String,
}

#[derive(Deserialize)]
pub struct NameParams {
    pub name: String,
}

#[derive(Deserialize)]
pub struct DeleteParams {
    pub name: String,
    pub secret: Option<String>,
}

#[derive(Deserialize)]
pub struct StoreChecksumParams {
    pub name: Option<String>,
    pub checksum: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
}

/// Worker heartbeat: refresh membership and fold the block report in. Names
/// suppressed by a live tombstone get a background delete sent back to the
/// reporting worker.
pub async fn handle_register(
    Extension(master): Extension<Arc<MasterNode>>,
    Query(params): Query<RegisterParams>,
    Json(names): Json<Vec<String>>,
) -> StatusCode {
    let suppressed = {
        let mut state = master.state.write().await;
        state.apply_block_report(&params.addr, names, Instant::now())
    };

    for name in suppressed {
        tracing::info!(
            "tombstone active for {}, scheduling purge on {}",
            name,
            params.addr
        );
        tokio::spawn(tasks::purge_resurrected(
            master.client.clone(),
            params.addr.clone(),
            name,
        ));
    }

    StatusCode::OK
}

/// Authenticated client upload. The payload is buffered once and pushed to
/// every ring target concurrently; one durable replica is enough for a 200,
/// the fixer brings the count back up later.
pub async fn handle_upload(
    Extension(master): Extension<Arc<MasterNode>>,
    mut multipart: Multipart,
) -> Response {
    let mut secret: Option<String> = None;
    let mut blob: Option<(String, Bytes)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("unreadable upload form: {}", e);
                return (StatusCode::BAD_REQUEST, "could not parse upload").into_response();
            }
        };
        match field.name() {
            Some(FIELD_SECRET) => secret = field.text().await.ok(),
            Some(FIELD_MOVIE) => {
                let name = field.file_name().map(str::to_string);
                let data = match field.bytes().await {
                    Ok(data) => data,
                    Err(e) => {
                        tracing::warn!("upload body read failed: {}", e);
                        return (StatusCode::BAD_REQUEST, "could not read file").into_response();
                    }
                };
                if let Some(name) = name {
                    blob = Some((name, data));
                }
            }
            _ => {}
        }
    }

    if secret.as_deref() != Some(master.config.admin_secret.as_str()) {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    let Some((name, data)) = blob else {
        return (StatusCode::BAD_REQUEST, "missing file").into_response();
    };
    if !mime::is_allowed(&name, &master.config.allowed_extensions) {
        return (StatusCode::BAD_REQUEST, "file type not allowed").into_response();
    }

    let targets = {
        let state = master.state.read().await;
        state.ring.nodes(&name, master.config.replicas)
    };
    if targets.is_empty() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "no storage nodes available").into_response();
    }

    let mut fanout = JoinSet::new();
    for target in targets {
        let client = master.client.clone();
        let name = name.clone();
        let data = data.clone();
        fanout.spawn(async move {
            let outcome = push_replica(&client, &target, &name, data).await;
            (target, outcome)
        });
    }

    let mut successes: Vec<(String, Option<String>)> = Vec::new();
    while let Some(joined) = fanout.join_next().await {
        match joined {
            Ok((target, Ok(checksum))) => {
                tracing::info!("replica stored: {} -> {}", name, target);
                successes.push((target, checksum));
            }
            Ok((target, Err(e))) => {
                tracing::warn!("replica write failed: {} -> {}: {}", name, target, e);
            }
            Err(e) => tracing::error!("upload fan-out task died: {}", e),
        }
    }

    if successes.is_empty() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "all storage nodes failed").into_response();
    }

    {
        let mut state = master.state.write().await;
        state.record_upload(&name, &successes);
    }
    tracing::info!("upload complete: {} ({} replicas)", name, successes.len());
    StatusCode::OK.into_response()
}

async fn push_replica(
    client: &reqwest::Client,
    target: &str,
    name: &str,
    data: Bytes,
) -> anyhow::Result<Option<String>> {
    let part = Part::stream(reqwest::Body::from(data)).file_name(name.to_string());
    let form = Form::new().part(FIELD_FILE, part);

    let resp = client
        .post(format!("{}/upload", target))
        .query(&[("name", name)])
        .multipart(form)
        .timeout(TRANSFER_TIMEOUT)
        .send()
        .await?;

    if resp.status() != StatusCode::OK {
        anyhow::bail!("worker answered {}", resp.status());
    }
    let body = resp.text().await.unwrap_or_default();
    Ok(body.strip_prefix(OK_PREFIX).map(str::to_string))
}

/// Client download: streamed from the first replica that answers.
pub async fn handle_download(
    Extension(master): Extension<Arc<MasterNode>>,
    Query(params): Query<NameParams>,
    headers: HeaderMap,
) -> Response {
    proxy_from_replicas(&master, &params.name, &headers, false).await
}

/// Like `/download` but rendered inline with the MIME type set, so browsers
/// play instead of saving.
pub async fn handle_play(
    Extension(master): Extension<Arc<MasterNode>>,
    Query(params): Query<NameParams>,
    headers: HeaderMap,
) -> Response {
    proxy_from_replicas(&master, &params.name, &headers, true).await
}

async fn proxy_from_replicas(
    master: &MasterNode,
    name: &str,
    headers: &HeaderMap,
    inline: bool,
) -> Response {
    let candidates = {
        let state = master.state.read().await;
        state.download_candidates(name)
    };

    for node in candidates {
        let mut request = master
            .client
            .get(format!("{}/download", node))
            .query(&[("name", name)]);
        if let Some(range) = headers.get(header::RANGE) {
            request = request.header(header::RANGE, range.clone());
        }

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("replica {} unreachable for {}: {}", node, name, e);
                continue;
            }
        };
        if resp.status().as_u16() >= 400 {
            tracing::warn!("replica {} answered {} for {}", node, resp.status(), name);
            continue;
        }

        let mut builder = Response::builder().status(resp.status());
        for (key, value) in resp.headers() {
            if key == header::TRANSFER_ENCODING
                || key == header::CONNECTION
                || key == header::CONTENT_DISPOSITION
                || (inline && key == header::CONTENT_TYPE)
            {
                continue;
            }
            builder = builder.header(key, value);
        }
        let kind = if inline { "inline" } else { "attachment" };
        builder = builder.header(header::CONTENT_DISPOSITION, content_disposition(kind, name));
        if inline {
            builder = builder.header(header::CONTENT_TYPE, mime::content_type_for(name));
        }

        match builder.body(Body::from_stream(resp.bytes_stream())) {
            Ok(response) => return response,
            Err(e) => {
                tracing::error!("building proxy response for {} failed: {}", name, e);
                continue;
            }
        }
    }

    (StatusCode::NOT_FOUND, "Unavailable").into_response()
}

fn content_disposition(kind: &str, name: &str) -> HeaderValue {
    let encoded = urlencoding::encode(name);
    let full = format!("{}; filename=\"{}\"; filename*=UTF-8''{}", kind, name, encoded);
    HeaderValue::from_str(&full).unwrap_or_else(|_| {
        // Non-ASCII names cannot ride in the plain filename parameter.
        HeaderValue::from_str(&format!("{}; filename*=UTF-8''{}", kind, encoded))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
    })
}

/// Administrative delete: best-effort fan-out, tombstone on first ack.
pub async fn handle_delete(
    Extension(master): Extension<Arc<MasterNode>>,
    Query(params): Query<DeleteParams>,
) -> Response {
    if params.secret.as_deref() != Some(master.config.admin_secret.as_str()) {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    let name = params.name;

    let holders: Vec<String> = {
        let state = master.state.read().await;
        state
            .file_index
            .get(&name)
            .map(|replicas| replicas.iter().cloned().collect())
            .unwrap_or_default()
    };
    if holders.is_empty() {
        return (StatusCode::NOT_FOUND, "file not found").into_response();
    }

    let mut fanout = JoinSet::new();
    for node in holders {
        let client = master.client.clone();
        let name = name.clone();
        fanout.spawn(async move {
            let acked = delete_replica(&client, &node, &name).await;
            (node, acked)
        });
    }

    let mut acked = Vec::new();
    while let Some(joined) = fanout.join_next().await {
        match joined {
            Ok((node, true)) => acked.push(node),
            Ok((node, false)) => tracing::warn!("delete not acked: {} -> {}", name, node),
            Err(e) => tracing::error!("delete fan-out task died: {}", e),
        }
    }

    let remaining = {
        let mut state = master.state.write().await;
        state.apply_delete_acks(&name, &acked, Instant::now())
    };
    if remaining == 0 {
        tracing::info!("{} removed from all nodes, tombstone stamped", name);
    } else {
        tracing::warn!(
            "{} partially deleted, {} replicas unaccounted for",
            name,
            remaining
        );
    }

    (StatusCode::OK, format!("OK:{}", acked.len())).into_response()
}

async fn delete_replica(client: &reqwest::Client, node: &str, name: &str) -> bool {
    let resp = client
        .get(format!("{}/delete", node))
        .query(&[("name", name)])
        .timeout(CONTROL_TIMEOUT)
        .send()
        .await;

    match resp {
        Ok(resp) if resp.status() == StatusCode::OK => resp
            .text()
            .await
            .map(|body| body == DELETE_ACK)
            .unwrap_or(false),
        Ok(resp) => {
            tracing::warn!("delete of {} on {} answered {}", name, node, resp.status());
            false
        }
        Err(e) => {
            tracing::warn!("delete request failed: {} -> {}: {}", name, node, e);
            false
        }
    }
}

/// Probe every replica for checksum agreement. Read-only; mismatches are
/// surfaced for operators, not acted on.
pub async fn handle_verify(
    Extension(master): Extension<Arc<MasterNode>>,
    Query(params): Query<NameParams>,
) -> Response {
    let (holders, expected) = {
        let state = master.state.read().await;
        let holders: Vec<String> = state
            .file_index
            .get(&params.name)
            .map(|replicas| replicas.iter().cloned().collect())
            .unwrap_or_default();
        (holders, state.checksums.get(&params.name).cloned())
    };
    if holders.is_empty() {
        return (StatusCode::NOT_FOUND, "file not found").into_response();
    }

    let mut fanout = JoinSet::new();
    for node in holders {
        let client = master.client.clone();
        let name = params.name.clone();
        let expected = expected.clone();
        fanout.spawn(async move { verify_replica(&client, &node, &name, expected.as_deref()).await });
    }

    let mut results = Vec::new();
    while let Some(joined) = fanout.join_next().await {
        match joined {
            Ok(entry) => results.push(entry),
            Err(e) => tracing::error!("verify fan-out task died: {}", e),
        }
    }
    results.sort_by(|a, b| a.node.cmp(&b.node));

    Json(results).into_response()
}

async fn verify_replica(
    client: &reqwest::Client,
    node: &str,
    name: &str,
    expected: Option<&str>,
) -> VerifyEntry {
    let mut query: Vec<(&str, &str)> = vec![("name", name)];
    if let Some(expected) = expected {
        query.push(("checksum", expected));
    }

    let resp = client
        .get(format!("{}/verify", node))
        .query(&query)
        .timeout(CONTROL_TIMEOUT)
        .send()
        .await;

    let body = match resp {
        Ok(resp) => resp.text().await.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("verify probe failed: {} -> {}: {}", name, node, e);
            return VerifyEntry {
                node: node.to_string(),
                checksum: CHECKSUM_ERROR.to_string(),
                valid: false,
            };
        }
    };

    if let Some(hex) = body.strip_prefix(OK_PREFIX) {
        VerifyEntry {
            node: node.to_string(),
            checksum: hex.to_string(),
            valid: true,
        }
    } else if let Some(hex) = body.strip_prefix(MISMATCH_PREFIX) {
        VerifyEntry {
            node: node.to_string(),
            checksum: hex.to_string(),
            valid: false,
        }
    } else {
        VerifyEntry {
            node: node.to_string(),
            checksum: CHECKSUM_UNKNOWN.to_string(),
            valid: false,
        }
    }
}

/// Record a checksum reported out-of-band.
pub async fn handle_checksum(
    Extension(master): Extension<Arc<MasterNode>>,
    Query(params): Query<StoreChecksumParams>,
) -> Response {
    let (Some(name), Some(checksum)) = (params.name, params.checksum) else {
        return (StatusCode::BAD_REQUEST, "missing name or checksum").into_response();
    };
    {
        let mut state = master.state.write().await;
        state.checksums.insert(name, checksum);
    }
    (StatusCode::OK, "OK").into_response()
}

/// Return the known checksum, lazily fetching (and caching) it from a
/// replica when the index has none. Absence is a bare 404 with an empty
/// body, so callers never have to parse error text.
pub async fn handle_get_checksum(
    Extension(master): Extension<Arc<MasterNode>>,
    Query(params): Query<NameParams>,
) -> Response {
    let (cached, holders) = {
        let state = master.state.read().await;
        let holders: Vec<String> = state
            .file_index
            .get(&params.name)
            .map(|replicas| replicas.iter().cloned().collect())
            .unwrap_or_default();
        (state.checksums.get(&params.name).cloned(), holders)
    };

    if let Some(checksum) = cached {
        return (StatusCode::OK, checksum).into_response();
    }

    for node in holders {
        let resp = net::get_with_retry(
            &master.client,
            &format!("{}/checksum", node),
            &[("name", params.name.as_str())],
            CONTROL_TIMEOUT,
            3,
        )
        .await;
        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("checksum fetch from {} failed: {}", node, e);
                continue;
            }
        };
        if resp.status() != StatusCode::OK {
            continue;
        }
        let body = resp.text().await.unwrap_or_default().trim().to_string();
        if body.is_empty() {
            continue;
        }

        {
            let mut state = master.state.write().await;
            state.checksums.insert(params.name.clone(), body.clone());
        }
        tracing::debug!("checksum for {} lazily fetched from {}", params.name, node);
        return (StatusCode::OK, body).into_response();
    }

    StatusCode::NOT_FOUND.into_response()
}

pub async fn handle_health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

pub async fn handle_stats(Extension(master): Extension<Arc<MasterNode>>) -> Response {
    let stats = {
        let state = master.state.read().await;
        state.stats()
    };
    Json(stats).into_response()
}

pub async fn handle_metrics(Extension(master): Extension<Arc<MasterNode>>) -> Response {
    let (stats, under_replicated) = {
        let state = master.state.read().await;
        (state.stats(), state.under_replicated(master.config.replicas))
    };

    let body = format!(
        "# HELP mdfs_active_nodes Number of active worker nodes\n\
         # TYPE mdfs_active_nodes gauge\n\
         mdfs_active_nodes {}\n\
         # HELP mdfs_total_files Total number of stored files\n\
         # TYPE mdfs_total_files gauge\n\
         mdfs_total_files {}\n\
         # HELP mdfs_under_replicated_files Number of files with less than {} replicas\n\
         # TYPE mdfs_under_replicated_files gauge\n\
         mdfs_under_replicated_files {}\n\
         # HELP mdfs_up System is up\n\
         # TYPE mdfs_up gauge\n\
         mdfs_up 1\n",
        stats.active_nodes, stats.total_files, master.config.replicas, under_replicated
    );

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Substring search over blob names, shaped like the file index
/// (`{name: {addr: true}}`).
pub async fn handle_search(
    Extension(master): Extension<Arc<MasterNode>>,
    Query(params): Query<SearchParams>,
) -> Response {
    let matches = {
        let state = master.state.read().await;
        state.search(&params.query)
    };
    Json(matches).into_response()
}
