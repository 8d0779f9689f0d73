use axum::extract::{DefaultBodyLimit, Extension};
use axum::routing::{get, post};
use axum::Router;

use mdfs::config::MasterConfig;
use mdfs::master::{console, handlers, tasks, MasterNode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let mut config = MasterConfig::from_env();

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" if i + 1 < args.len() => {
                config.bind = args[i + 1].parse()?;
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let master = MasterNode::new(config);
    tasks::spawn_background_loops(master.clone());

    let app = Router::new()
        .route("/register", post(handlers::handle_register))
        .route("/upload", post(handlers::handle_upload))
        .route("/download", get(handlers::handle_download))
        .route("/play", get(handlers::handle_play))
        .route("/delete", get(handlers::handle_delete))
        .route("/verify", get(handlers::handle_verify))
        .route("/checksum", get(handlers::handle_checksum))
        .route("/get-checksum", get(handlers::handle_get_checksum))
        .route("/health", get(handlers::handle_health))
        .route("/stats", get(handlers::handle_stats))
        .route("/metrics", get(handlers::handle_metrics))
        .route("/search", get(handlers::handle_search))
        .route("/", get(console::handle_index))
        .layer(DefaultBodyLimit::max(master.config.max_body_bytes))
        .layer(Extension(master.clone()));

    tracing::info!("mdfs master listening on {}", master.config.bind);
    let listener = tokio::net::TcpListener::bind(master.config.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
