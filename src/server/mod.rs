use crate::assist::{CaptionService, ReplicateClient};
use crate::config::Config;
use crate::dataset::{Dataset, DatasetLocks};
use crate::download::{Downloader, ToolDownloader};
use crate::streaming;
use crate::trim::{TrimEngine, TrimOptions};
use anyhow::{Context, Result};
use axum::{
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use clipforged_av::{FfmpegTranscoder, MediaTool, Transcoder};
use clipforged_common::{Error, PathSandbox};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

pub mod error;
pub mod routes_assist;
pub mod routes_dataset;

pub use error::AppError;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    /// Every request path is resolved through this.
    pub sandbox: Arc<PathSandbox>,
    /// Per-dataset writer locks.
    pub locks: DatasetLocks,
    pub transcoder: Arc<dyn Transcoder>,
    pub assist: Arc<dyn CaptionService>,
    pub downloader: Arc<dyn Downloader>,
}

impl AppContext {
    /// Assemble a context from explicit collaborators.
    pub fn new(
        config: Config,
        transcoder: Arc<dyn Transcoder>,
        assist: Arc<dyn CaptionService>,
        downloader: Arc<dyn Downloader>,
    ) -> clipforged_common::Result<Self> {
        let sandbox = PathSandbox::new(&config.dataset.root)?;
        Ok(Self {
            config: Arc::new(config),
            sandbox: Arc::new(sandbox),
            locks: DatasetLocks::new(),
            transcoder,
            assist,
            downloader,
        })
    }

    /// Build the production context: ffmpeg, yt-dlp, and the assist API.
    pub fn from_config(config: Config) -> Result<Self> {
        let timeout = Duration::from_secs(config.tools.timeout_secs);
        let ffmpeg = MediaTool::Ffmpeg.locate_or_bare(config.tools.ffmpeg_path.as_deref());
        let ytdlp = MediaTool::YtDlp.locate_or_bare(config.tools.ytdlp_path.as_deref());

        let transcoder: Arc<dyn Transcoder> = Arc::new(FfmpegTranscoder::new(
            ffmpeg,
            config.transcode.clone(),
            timeout,
        ));
        let assist = Arc::new(ReplicateClient::new(&config.assist));
        let downloader = Arc::new(ToolDownloader::new(ytdlp, transcoder.clone(), timeout));

        Self::new(config, transcoder, assist, downloader).context("Invalid dataset root")
    }

    /// Open the dataset named by a request, falling back to the configured
    /// default meta store.
    pub fn dataset(&self, meta_path: Option<&str>) -> clipforged_common::Result<Dataset> {
        let meta_path = match meta_path.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => PathBuf::from(p),
            None => self
                .config
                .dataset
                .default_meta_path
                .clone()
                .ok_or_else(|| Error::missing_field("metaPath"))?,
        };
        Dataset::open(&self.sandbox, meta_path, &self.config.dataset.derived_file_name)
    }

    pub fn trim_engine(&self) -> TrimEngine {
        TrimEngine::new(
            self.sandbox.clone(),
            self.transcoder.clone(),
            TrimOptions {
                processed_dir: self.config.dataset.processed_dir.clone(),
                replace_existing: self.config.trim.replace_existing,
            },
        )
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext, static_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::RANGE]);

    let mut app = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    // SPA fallback: serve index.html for any route that doesn't match a file
    if let Some(dir) = static_dir {
        if dir.exists() {
            tracing::info!("Serving static files from {:?}", dir);
            let index_path = dir.join("index.html");
            app = app.fallback_service(
                ServeDir::new(&dir)
                    .append_index_html_on_directories(true)
                    .not_found_service(ServeFile::new(index_path)),
            );
        }
    }

    app
}

fn api_routes() -> Router<AppContext> {
    routes_dataset::dataset_routes()
        .merge(routes_assist::assist_routes())
        .merge(streaming::media_router())
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let static_dir = config.server.static_dir.clone();
    let ctx = AppContext::from_config(config)?;
    tracing::info!("Sandbox root: {}", ctx.sandbox.root().display());

    let app = create_router(ctx, static_dir);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
