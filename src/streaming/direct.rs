//! Direct file serving with HTTP range requests.
//!
//! Serves any file under the sandbox root. A single `bytes=<start>-<end>`
//! range is honored; anything else in a `Range` header is answered with
//! 416 and `Content-Range: bytes */<size>`.

use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use clipforged_common::paths::content_type_for;
use clipforged_common::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::LazyLock;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::server::{AppContext, AppError};

static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^bytes=(\d+)-(\d*)$").unwrap_or_else(|e| panic!("invalid range pattern: {e}"))
});

/// An inclusive byte span within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered; never zero.
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Parse a `Range` header against a file of `file_size` bytes.
///
/// Accepts `bytes=N-M` and `bytes=N-`. An end past EOF is clamped to the
/// last byte. Suffix ranges (`bytes=-N`) and multi-range lists are rejected.
pub fn parse_range_header(header: &str, file_size: u64) -> Result<ByteRange> {
    let caps = RANGE_RE
        .captures(header.trim())
        .ok_or_else(|| Error::InvalidRange(format!("unsupported range {header:?}")))?;

    let start: u64 = caps[1]
        .parse()
        .map_err(|_| Error::InvalidRange(format!("range start out of bounds in {header:?}")))?;
    if start >= file_size {
        return Err(Error::InvalidRange(format!(
            "range start {start} is beyond file size {file_size}"
        )));
    }

    let last = file_size - 1;
    let end = match &caps[2] {
        "" => last,
        digits => digits.parse::<u64>().map(|e| e.min(last)).unwrap_or(last),
    };
    if end < start {
        return Err(Error::InvalidRange(format!(
            "range end {end} is before start {start}"
        )));
    }

    Ok(ByteRange { start, end })
}

/// Stream `path`, honoring an optional `Range` header value.
///
/// `path` must already have passed the sandbox.
pub async fn serve_file(path: &Path, range_header: Option<&str>) -> Result<Response> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => m,
        Ok(_) => return Err(Error::not_found(path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::not_found(path.display()))
        }
        Err(e) => return Err(e.into()),
    };
    let file_size = metadata.len();
    let content_type = content_type_for(path);

    let mut file = File::open(path).await?;

    let Some(header_value) = range_header else {
        let body = Body::from_stream(ReaderStream::new(file));
        return build(
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, file_size.to_string())
                .header(header::ACCEPT_RANGES, "bytes")
                // Trim outputs are overwritten in place.
                .header(header::CACHE_CONTROL, "no-cache"),
            body,
        );
    };

    let range = match parse_range_header(header_value, file_size) {
        Ok(range) => range,
        Err(e) => return Ok(unsatisfiable(e, file_size)),
    };

    file.seek(SeekFrom::Start(range.start)).await?;
    let length = range.length();
    let body = Body::from_stream(ReaderStream::new(file.take(length)));

    build(
        Response::builder()
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, length.to_string())
            .header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", range.start, range.end, file_size),
            )
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::CACHE_CONTROL, "no-cache"),
        body,
    )
}

fn build(builder: axum::http::response::Builder, body: Body) -> Result<Response> {
    builder
        .body(body)
        .map_err(|e| Error::Internal(format!("failed to build response: {e}")))
}

fn unsatisfiable(error: Error, file_size: u64) -> Response {
    tracing::debug!("{}", error);
    let mut response = AppError::new(error).into_response();
    if let Ok(value) = HeaderValue::from_str(&format!("bytes */{file_size}")) {
        response.headers_mut().insert(header::CONTENT_RANGE, value);
    }
    response
}

#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    pub path: Option<String>,
}

/// `GET /api/media?path=<file>`
pub async fn media(
    State(ctx): State<AppContext>,
    query: std::result::Result<Query<MediaQuery>, QueryRejection>,
    headers: HeaderMap,
) -> std::result::Result<Response, AppError> {
    let Query(query) = query?;
    let requested = query
        .path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::missing_field("path"))?;

    // Confinement happens before any filesystem access.
    let path = ctx.sandbox.resolve(requested)?;

    let range = match headers.get(header::RANGE) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| Error::InvalidRange("range header is not ASCII".to_string()))?,
        ),
        None => None,
    };

    Ok(serve_file(&path, range).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_header_full_range() {
        assert_eq!(
            parse_range_header("bytes=0-499", 1000).unwrap(),
            ByteRange { start: 0, end: 499 }
        );
    }

    #[test]
    fn test_parse_range_header_open_end() {
        assert_eq!(
            parse_range_header("bytes=500-", 1000).unwrap(),
            ByteRange { start: 500, end: 999 }
        );
    }

    #[test]
    fn test_parse_range_header_clamped() {
        let range = parse_range_header("bytes=0-2000", 1000).unwrap();
        assert_eq!(range, ByteRange { start: 0, end: 999 });
        assert_eq!(range.length(), 1000);
    }

    #[test]
    fn test_parse_range_header_suffix_rejected() {
        assert!(matches!(
            parse_range_header("bytes=-200", 1000),
            Err(Error::InvalidRange(_))
        ));
    }

    #[test]
    fn test_parse_range_header_multi_rejected() {
        assert!(parse_range_header("bytes=0-1,5-6", 1000).is_err());
    }

    #[test]
    fn test_parse_range_header_invalid_start() {
        assert!(parse_range_header("bytes=1500-", 1000).is_err());
        assert!(parse_range_header("bytes=0-", 0).is_err());
    }

    #[test]
    fn test_parse_range_header_invalid_format() {
        assert!(parse_range_header("bytes=-", 1000).is_err());
        assert!(parse_range_header("bytes=abc-def", 1000).is_err());
        assert!(parse_range_header("items=0-1", 1000).is_err());
        assert!(parse_range_header("bytes=9-3", 1000).is_err());
    }

    #[tokio::test]
    async fn serve_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = serve_file(&dir.path().join("nope.mp4"), None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let err = serve_file(dir.path(), None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn serve_unsatisfiable_sets_content_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp3");
        std::fs::write(&path, vec![0u8; 10]).unwrap();
        let response = serve_file(&path, Some("bytes=20-")).await.unwrap();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */10");
    }
}
