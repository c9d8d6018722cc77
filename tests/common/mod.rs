//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates a temporary dataset directory, a
//! config rooted at it, and an [`AppContext`] wired to in-process fakes for
//! ffmpeg, the downloader, and the AI service. [`TestHarness::send`] drives
//! the router with `oneshot`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use clipforged::assist::CaptionService;
use clipforged::config::Config;
use clipforged::download::{DownloadWindow, Downloader};
use clipforged::server::{create_router, AppContext};
use clipforged_av::{TranscodeJob, Transcoder};
use clipforged_common::{Error, Result};

pub const META: &str = "dataset_meta.jsonl";
pub const DERIVED: &str = "dataset.jsonl";

/// Writes a small placeholder for every job; can be told to fail.
#[derive(Default)]
pub struct FakeTranscoder {
    pub jobs: Mutex<Vec<TranscodeJob>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(&self, job: &TranscodeJob) -> Result<()> {
        self.jobs.lock().unwrap().push(job.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::tool("ffmpeg", "Conversion failed! (fake)"));
        }
        std::fs::write(&job.output, b"fake media")?;
        Ok(())
    }
}

/// Returns canned text.
pub struct FakeAssist {
    pub caption: String,
    pub transcription: String,
    pub seen: Mutex<Vec<(usize, String)>>,
}

impl Default for FakeAssist {
    fn default() -> Self {
        Self {
            caption: "A dog chases a ball across a lawn.".to_string(),
            transcription: "good boy".to_string(),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CaptionService for FakeAssist {
    async fn caption(&self, media: &[u8], mime: &str) -> Result<String> {
        self.seen.lock().unwrap().push((media.len(), mime.to_string()));
        Ok(self.caption.clone())
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        self.seen
            .lock()
            .unwrap()
            .push((audio.len(), "audio/mp3".to_string()));
        Ok(self.transcription.clone())
    }
}

/// Drops a file named `fetched.mp4` into the destination.
#[derive(Default)]
pub struct FakeDownloader {
    pub calls: Mutex<Vec<(String, PathBuf, DownloadWindow)>>,
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        window: &DownloadWindow,
    ) -> Result<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), dest_dir.to_path_buf(), window.clone()));
        std::fs::create_dir_all(dest_dir)?;
        let path = dest_dir.join("fetched.mp4");
        std::fs::write(&path, b"downloaded")?;
        Ok(path)
    }
}

pub struct TestHarness {
    pub dir: TempDir,
    pub ctx: AppContext,
    pub transcoder: Arc<FakeTranscoder>,
    pub assist: Arc<FakeAssist>,
    pub downloader: Arc<FakeDownloader>,
}

impl TestHarness {
    /// Harness with default configuration rooted at a fresh temp directory.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Harness whose config is adjusted by `tweak` before the context is built.
    pub fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let mut config = Config::default();
        config.dataset.root = dir.path().to_path_buf();
        config.dataset.default_meta_path = Some(PathBuf::from(META));
        tweak(&mut config);

        let transcoder = Arc::new(FakeTranscoder::default());
        let assist = Arc::new(FakeAssist::default());
        let downloader = Arc::new(FakeDownloader::default());
        let ctx = AppContext::new(
            config,
            transcoder.clone(),
            assist.clone(),
            downloader.clone(),
        )
        .expect("failed to build context");

        Self {
            dir,
            ctx,
            transcoder,
            assist,
            downloader,
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.ctx.clone(), None)
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write_file(&self, rel: &str, contents: &[u8]) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub fn write_jsonl(&self, rel: &str, records: &[Value]) {
        let text: String = records.iter().map(|r| format!("{r}\n")).collect();
        self.write_file(rel, text.as_bytes());
    }

    pub fn read_jsonl(&self, rel: &str) -> Vec<Value> {
        std::fs::read_to_string(self.path(rel))
            .unwrap()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    pub fn read_raw(&self, rel: &str) -> Option<String> {
        std::fs::read_to_string(self.path(rel)).ok()
    }

    /// Send one request through a fresh router.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, bytes.to_vec())
    }

    /// Send one request and parse the body as JSON.
    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(request).await;
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}
