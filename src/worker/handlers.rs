//! Worker HTTP handlers: the thin shim between axum and the blob store.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Extension, Multipart, Query};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use super::range::{self, RangeSpec};
use super::store::{self, BlobStore, VerifyOutcome};
use crate::mime;
use crate::protocol::{DELETE_ACK, FIELD_FILE, MISMATCH_PREFIX, NO_CHECKSUM_FILE, OK_PREFIX};

#[derive(Deserialize)]
pub struct NameParams {
    pub name: String,
}

#[derive(Deserialize)]
pub struct VerifyParams {
    pub name: String,
    pub checksum: Option<String>,
}

/// Streams the multipart `file` field into an atomic put and acks with the
/// digest. Any failure mid-stream drops the tempfile and leaves whatever was
/// previously stored under the name untouched.
pub async fn handle_upload(
    Extension(blob_store): Extension<Arc<BlobStore>>,
    Query(params): Query<NameParams>,
    mut multipart: Multipart,
) -> (StatusCode, String) {
    if !store::is_valid_name(&params.name) {
        return (StatusCode::BAD_REQUEST, "invalid blob name".to_string());
    }

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("unreadable upload form for {}: {}", params.name, e);
                return (StatusCode::BAD_REQUEST, "could not read upload".to_string());
            }
        };
        if field.name() != Some(FIELD_FILE) {
            continue;
        }

        let mut writer = match blob_store.writer(&params.name).await {
            Ok(writer) => writer,
            Err(e) => {
                tracing::error!("tempfile create failed for {}: {}", params.name, e);
                return (StatusCode::INTERNAL_SERVER_ERROR, "store failed".to_string());
            }
        };

        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    if let Err(e) = writer.append(&chunk).await {
                        tracing::error!("write failed for {}: {}", params.name, e);
                        writer.abort().await;
                        return (StatusCode::INTERNAL_SERVER_ERROR, "store failed".to_string());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    // Client went away mid-stream; keep the directory clean.
                    tracing::warn!("upload stream for {} broke: {}", params.name, e);
                    writer.abort().await;
                    return (StatusCode::INTERNAL_SERVER_ERROR, "store failed".to_string());
                }
            }
        }

        return match writer.finish().await {
            Ok(checksum) => {
                tracing::info!("stored blob {} (checksum: {})", params.name, checksum);
                (StatusCode::OK, format!("{}{}", OK_PREFIX, checksum))
            }
            Err(e) => {
                tracing::error!("finalize failed for {}: {}", params.name, e);
                (StatusCode::INTERNAL_SERVER_ERROR, "store failed".to_string())
            }
        };
    }

    (StatusCode::BAD_REQUEST, "missing file field".to_string())
}

/// Streams a blob, honouring single-range requests with 206/416.
pub async fn handle_download(
    Extension(blob_store): Extension<Arc<BlobStore>>,
    Query(params): Query<NameParams>,
    headers: HeaderMap,
) -> Response {
    let (mut file, size) = match blob_store.open(&params.name).await {
        Ok(Some(opened)) => opened,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::warn!("open failed for {}: {}", params.name, e);
            return StatusCode::NOT_FOUND.into_response();
        }
    };
    let content_type = mime::content_type_for(&params.name);
    let range_header = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    match range::parse(range_header, size) {
        RangeSpec::Full => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, size)
            .header(header::ACCEPT_RANGES, "bytes")
            .body(Body::from_stream(ReaderStream::new(file)))
            .unwrap_or_else(internal_error),
        RangeSpec::Satisfiable { start, end } => {
            if let Err(e) = file.seek(std::io::SeekFrom::Start(start)).await {
                tracing::error!("seek failed for {}: {}", params.name, e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            let len = end - start + 1;
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, len)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, size),
                )
                .header(header::ACCEPT_RANGES, "bytes")
                .body(Body::from_stream(ReaderStream::new(file.take(len))))
                .unwrap_or_else(internal_error)
        }
        RangeSpec::Unsatisfiable => Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{}", size))
            .body(Body::empty())
            .unwrap_or_else(internal_error),
    }
}

fn internal_error(e: axum::http::Error) -> Response {
    tracing::error!("response build failed: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

pub async fn handle_verify(
    Extension(blob_store): Extension<Arc<BlobStore>>,
    Query(params): Query<VerifyParams>,
) -> (StatusCode, String) {
    let expected = params.checksum.as_deref().filter(|value| !value.is_empty());
    match blob_store.verify(&params.name, expected).await {
        Ok(VerifyOutcome::Match(hex)) => (StatusCode::OK, format!("{}{}", OK_PREFIX, hex)),
        Ok(VerifyOutcome::Mismatch(hex)) => (
            StatusCode::BAD_REQUEST,
            format!("{}{}", MISMATCH_PREFIX, hex),
        ),
        Ok(VerifyOutcome::MissingBlob) => (StatusCode::NOT_FOUND, "file not found".to_string()),
        Ok(VerifyOutcome::MissingChecksum) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            NO_CHECKSUM_FILE.to_string(),
        ),
        Err(e) => {
            tracing::error!("verify of {} failed: {}", params.name, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "verify failed".to_string())
        }
    }
}

pub async fn handle_checksum(
    Extension(blob_store): Extension<Arc<BlobStore>>,
    Query(params): Query<NameParams>,
) -> (StatusCode, String) {
    match blob_store.stored_checksum(&params.name).await {
        Ok(Some(checksum)) => (StatusCode::OK, checksum),
        Ok(None) => (StatusCode::NOT_FOUND, "no checksum file".to_string()),
        Err(e) => {
            tracing::error!("sidecar read for {} failed: {}", params.name, e);
            (StatusCode::NOT_FOUND, "no checksum file".to_string())
        }
    }
}

pub async fn handle_delete(
    Extension(blob_store): Extension<Arc<BlobStore>>,
    Query(params): Query<NameParams>,
) -> (StatusCode, String) {
    match blob_store.delete(&params.name).await {
        Ok(()) => (StatusCode::OK, DELETE_ACK.to_string()),
        Err(e) => {
            tracing::error!("delete of {} failed: {}", params.name, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "delete failed".to_string())
        }
    }
}

pub async fn handle_health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

pub async fn handle_metrics(Extension(blob_store): Extension<Arc<BlobStore>>) -> Response {
    let (files, bytes) = match blob_store.usage().await {
        Ok(usage) => usage,
        Err(e) => {
            tracing::error!("usage scan failed: {}", e);
            (0, 0)
        }
    };

    let body = format!(
        "# HELP mdfs_worker_files Number of files stored\n\
         # TYPE mdfs_worker_files gauge\n\
         mdfs_worker_files {}\n\
         # HELP mdfs_worker_bytes_total Total bytes stored\n\
         # TYPE mdfs_worker_bytes_total counter\n\
         mdfs_worker_bytes_total {}\n\
         # HELP mdfs_worker_up Worker is up\n\
         # TYPE mdfs_worker_up gauge\n\
         mdfs_worker_up 1\n",
        files, bytes
    );

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}
