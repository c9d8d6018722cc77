//! Fetching source clips from the web.
//!
//! Known video hosts go through yt-dlp, which can cut a section server-side.
//! Anything else is fetched directly and, when a time window was asked for,
//! cut afterwards with an ffmpeg stream copy.

use clipforged_av::{ToolCommand, TranscodeJob, Transcoder};
use clipforged_common::{Error, Result};
use reqwest::{header, Client, Url};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Hosts handed to yt-dlp, matched as the host or any of its subdomains.
pub const YTDLP_HOSTS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "bilibili.com",
    "b23.tv",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "vimeo.com",
];

/// Douyin's CDN refuses requests without a matching Referer.
const DOUYIN_CDN: &str = "douyinvod.com";
const DOUYIN_REFERER: &str = "https://www.douyin.com/";

/// Requested time window, as typed by the user (`SS`, `MM:SS`, `HH:MM:SS`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadWindow {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl DownloadWindow {
    pub fn new(start: Option<String>, end: Option<String>) -> Self {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self {
            start: clean(start),
            end: clean(end),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Parsed bounds in seconds; the start defaults to zero.
    pub fn seconds(&self) -> Result<(f64, Option<f64>)> {
        let start = self.start.as_deref().map(parse_timestamp).transpose()?.unwrap_or(0.0);
        let end = self.end.as_deref().map(parse_timestamp).transpose()?;
        if let Some(end) = end {
            if end <= start {
                return Err(Error::validation(format!(
                    "download end ({end}s) must be after start ({start}s)"
                )));
            }
        }
        Ok((start, end))
    }

    /// yt-dlp `--download-sections` value.
    fn section(&self) -> String {
        format!(
            "*{}-{}",
            self.start.as_deref().unwrap_or("0"),
            self.end.as_deref().unwrap_or("inf")
        )
    }
}

/// Parse `SS`, `MM:SS`, or `HH:MM:SS` (fractional seconds allowed).
pub fn parse_timestamp(input: &str) -> Result<f64> {
    let invalid = || Error::validation(format!("invalid time: {input:?}"));
    let parts: Vec<f64> = input
        .trim()
        .split(':')
        .map(|p| p.trim().parse::<f64>().map_err(|_| invalid()))
        .collect::<Result<_>>()?;
    if parts.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(invalid());
    }
    match parts.as_slice() {
        [s] => Ok(*s),
        [m, s] => Ok(m * 60.0 + s),
        [h, m, s] => Ok(h * 3600.0 + m * 60.0 + s),
        _ => Err(invalid()),
    }
}

/// Whether `url` belongs to a host that yt-dlp handles.
pub fn uses_ytdlp(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    YTDLP_HOSTS
        .iter()
        .any(|known| host == *known || host.ends_with(&format!(".{known}")))
}

/// Something that can bring a remote clip into a local directory.
#[async_trait::async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` into `dest_dir`, returning the path of the final file.
    async fn download(&self, url: &str, dest_dir: &Path, window: &DownloadWindow)
        -> Result<PathBuf>;
}

/// [`Downloader`] backed by yt-dlp, plain HTTP, and ffmpeg.
pub struct ToolDownloader {
    client: Client,
    ytdlp: PathBuf,
    transcoder: Arc<dyn Transcoder>,
    timeout: Duration,
}

impl ToolDownloader {
    pub fn new(ytdlp: PathBuf, transcoder: Arc<dyn Transcoder>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });
        Self {
            client,
            ytdlp,
            transcoder,
            timeout,
        }
    }

    async fn with_ytdlp(
        &self,
        url: &Url,
        dest_dir: &Path,
        window: &DownloadWindow,
    ) -> Result<PathBuf> {
        let template = dest_dir.join("%(title)s.%(ext)s");
        let mut cmd = ToolCommand::new(self.ytdlp.clone());
        cmd.args(["--no-playlist", "--no-simulate", "--print", "after_move:filepath"])
            .arg("-o")
            .arg(template.to_string_lossy())
            .timeout(self.timeout);
        if !window.is_empty() {
            cmd.arg("--download-sections").arg(window.section());
        }
        cmd.arg(url.as_str());

        let output = cmd.execute().await?;
        let path = output
            .last_stdout_line()
            .ok_or_else(|| Error::tool("yt-dlp", "did not report an output file"))?;
        Ok(PathBuf::from(path))
    }

    async fn with_fetch(
        &self,
        url: &Url,
        dest_dir: &Path,
        window: &DownloadWindow,
    ) -> Result<PathBuf> {
        let mut request = self.client.get(url.clone());
        if url.host_str().is_some_and(|h| h.ends_with(DOUYIN_CDN)) {
            request = request.header(header::REFERER, DOUYIN_REFERER);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::tool("fetch", format!("request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::tool(
                "fetch",
                format!("{} returned {}", url, response.status()),
            ));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let filename = fetched_file_name(url, &content_type);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::tool("fetch", format!("reading body failed: {e}")))?;

        let path = dest_dir.join(&filename);
        tokio::fs::write(&path, &bytes).await?;
        tracing::info!("Fetched {} bytes into {}", bytes.len(), path.display());

        if window.is_empty() {
            return Ok(path);
        }

        let (start, end) = window.seconds()?;
        let trimmed = dest_dir.join(trimmed_name(&filename));
        let cut = TranscodeJob::copy(path.clone(), trimmed.clone(), start, end);
        let result = self.transcoder.transcode(&cut).await;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
        result?;
        Ok(trimmed)
    }
}

#[async_trait::async_trait]
impl Downloader for ToolDownloader {
    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        window: &DownloadWindow,
    ) -> Result<PathBuf> {
        let parsed = Url::parse(url.trim())
            .map_err(|e| Error::validation(format!("invalid url {url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::validation(format!(
                "unsupported url scheme: {}",
                parsed.scheme()
            )));
        }
        // Reject bad windows before any network traffic.
        window.seconds()?;
        tokio::fs::create_dir_all(dest_dir).await?;

        if uses_ytdlp(&parsed) {
            tracing::info!("Downloading {} with yt-dlp", parsed);
            self.with_ytdlp(&parsed, dest_dir, window).await
        } else {
            tracing::info!("Downloading {} directly", parsed);
            self.with_fetch(&parsed, dest_dir, window).await
        }
    }
}

/// Last path segment of `url`, with an extension inferred from the
/// content type when the segment has none.
fn fetched_file_name(url: &Url, content_type: &str) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or("download");
    if Path::new(segment).extension().is_some() {
        return segment.to_string();
    }
    let ext = if content_type.contains("video/mp4") {
        "mp4"
    } else if content_type.contains("video/webm") {
        "webm"
    } else if content_type.contains("audio/mpeg") {
        "mp3"
    } else {
        "bin"
    };
    format!("{segment}.{ext}")
}

/// `clip.mp4` -> `clip_trimmed.mp4`.
fn trimmed_name(filename: &str) -> String {
    let path = Path::new(filename);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => format!(
            "{}_trimmed.{}",
            stem.to_string_lossy(),
            ext.to_string_lossy()
        ),
        _ => format!("{filename}_trimmed"),
    }
}
