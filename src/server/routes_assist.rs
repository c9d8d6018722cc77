//! Download, AI caption, and transcription routes.

use super::{AppContext, AppError};
use crate::download::DownloadWindow;
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use clipforged_av::TranscodeJob;
use clipforged_common::paths::{content_type_for, relative_to};
use clipforged_common::{Error, Result};
use clipforged_store::{CaptureType, DownloadRange, EntryPatch, MetaEntry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub fn assist_routes() -> Router<AppContext> {
    Router::new()
        .route("/download", post(download))
        .route("/generate-caption", post(generate_caption))
        .route("/transcribe", post(transcribe))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub url: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub meta_path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub filename: String,
    pub path: String,
    pub dataset_path: PathBuf,
    pub index: usize,
}

async fn download(
    State(ctx): State<AppContext>,
    body: std::result::Result<Json<DownloadRequest>, JsonRejection>,
) -> std::result::Result<Json<DownloadResponse>, AppError> {
    let Json(req) = body?;
    let url = req
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| Error::missing_field("url"))?
        .to_string();
    let window = DownloadWindow::new(req.start_time, req.end_time);
    let dataset = ctx.dataset(req.meta_path.as_deref())?;
    let dest = ctx
        .sandbox
        .resolve(dataset.base_dir().join(&ctx.config.dataset.downloads_dir))?;

    // The fetch itself runs unlocked; only the append needs exclusivity.
    let fetched = ctx.downloader.download(&url, &dest, &window).await?;
    let fetched = ctx.sandbox.resolve(&fetched)?;
    if !fetched.is_file() {
        return Err(Error::tool("download", format!("{} was not created", fetched.display())).into());
    }

    let relative = relative_to(dataset.base_dir(), &fetched)
        .to_string_lossy()
        .replace('\\', "/");
    let entry = MetaEntry {
        media_path: Some(relative.clone()),
        caption: Some(String::new()),
        source_url: Some(url),
        download_range: (!window.is_empty()).then(|| DownloadRange {
            start: window.start.clone().unwrap_or_else(|| "0".to_string()),
            end: window.end.clone().unwrap_or_else(|| "end".to_string()),
        }),
        ..Default::default()
    };

    let _guard = ctx.locks.acquire(dataset.meta_path()).await;
    let index = dataset.store().append(entry)?;

    Ok(Json(DownloadResponse {
        filename: fetched
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        path: relative,
        dataset_path: dataset.meta_path().to_path_buf(),
        index,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistRequest {
    pub video_path: Option<String>,
    pub meta_path: Option<String>,
    pub index: Option<usize>,
}

impl AssistRequest {
    fn video(&self, ctx: &AppContext) -> Result<PathBuf> {
        let path = self
            .video_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::missing_field("videoPath"))?;
        let resolved = ctx.sandbox.resolve(path)?;
        if !resolved.is_file() {
            return Err(Error::not_found(resolved.display()));
        }
        Ok(resolved)
    }
}

/// Store assist output on the entry at `index`, if one was named.
async fn record(
    ctx: &AppContext,
    meta_path: Option<&str>,
    index: Option<usize>,
    patch: EntryPatch,
) -> Result<()> {
    let Some(index) = index else {
        return Ok(());
    };
    let dataset = ctx.dataset(meta_path)?;
    let _guard = ctx.locks.acquire(dataset.meta_path()).await;
    dataset.store().update_with_derived(index, &patch)?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct CaptionResponse {
    pub caption: String,
}

async fn generate_caption(
    State(ctx): State<AppContext>,
    body: std::result::Result<Json<AssistRequest>, JsonRejection>,
) -> std::result::Result<Json<CaptionResponse>, AppError> {
    let Json(req) = body?;
    let video = req.video(&ctx)?;
    let bytes = tokio::fs::read(&video).await.map_err(Error::from)?;

    let caption = ctx.assist.caption(&bytes, video_mime(&video)).await?;
    tracing::info!("Generated caption for {}", video.display());

    record(
        &ctx,
        req.meta_path.as_deref(),
        req.index,
        EntryPatch::default()
            .caption(caption.clone())
            .capture_type(CaptureType::Ai),
    )
    .await?;

    Ok(Json(CaptionResponse { caption }))
}

#[derive(Debug, Serialize)]
pub struct TranscriptionResponse {
    pub transcription: String,
}

async fn transcribe(
    State(ctx): State<AppContext>,
    body: std::result::Result<Json<AssistRequest>, JsonRejection>,
) -> std::result::Result<Json<TranscriptionResponse>, AppError> {
    let Json(req) = body?;
    let video = req.video(&ctx)?;

    let scratch = tempfile::tempdir().map_err(Error::from)?;
    let audio = scratch.path().join("speech.mp3");
    ctx.transcoder
        .transcode(&TranscodeJob::speech_audio(video.clone(), audio.clone()))
        .await?;
    let bytes = tokio::fs::read(&audio).await.map_err(Error::from)?;

    let transcription = ctx.assist.transcribe(&bytes).await?;
    tracing::info!("Transcribed {}", video.display());

    record(
        &ctx,
        req.meta_path.as_deref(),
        req.index,
        EntryPatch::default().speech(transcription.clone()),
    )
    .await?;

    Ok(Json(TranscriptionResponse { transcription }))
}

fn video_mime(path: &Path) -> &'static str {
    match content_type_for(path) {
        mime if mime.starts_with("video/") => mime,
        _ => "video/mp4",
    }
}
