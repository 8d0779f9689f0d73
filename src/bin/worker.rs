use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Extension};
use axum::routing::{get, post};
use axum::Router;

use mdfs::config::WorkerConfig;
use mdfs::worker::{handlers, heartbeat, store::BlobStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut port: u16 = 8081;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                port = args[i + 1].parse()?;
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let config = WorkerConfig::from_env(port);

    // The one fatal startup error: without the data directory there is
    // nothing to serve.
    let blob_store = Arc::new(BlobStore::create(&config.data_dir)?);

    let client = reqwest::Client::new();
    tokio::spawn(heartbeat::run(blob_store.clone(), client, config.clone()));

    let app = Router::new()
        .route("/upload", post(handlers::handle_upload))
        .route("/download", get(handlers::handle_download))
        .route("/verify", get(handlers::handle_verify))
        .route("/checksum", get(handlers::handle_checksum))
        .route("/delete", get(handlers::handle_delete))
        .route("/health", get(handlers::handle_health))
        .route("/metrics", get(handlers::handle_metrics))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(Extension(blob_store.clone()));

    let bind = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(
        "mdfs worker {} serving {} on {}",
        config.my_addr,
        blob_store.root().display(),
        bind
    );
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
