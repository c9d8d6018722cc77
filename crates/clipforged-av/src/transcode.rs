//! Clip transcoding through ffmpeg.
//!
//! A [`TranscodeJob`] names an input, an output, an optional time window and
//! crop, and what kind of output to produce. [`FfmpegTranscoder`] turns that
//! into one ffmpeg invocation; tests substitute their own [`Transcoder`].

use crate::command::ToolCommand;
use async_trait::async_trait;
use clipforged_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// A `[start, end)` window in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    /// Build a range, requiring finite `0 <= start < end`.
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(Error::validation("time range bounds must be finite numbers"));
        }
        if start < 0.0 {
            return Err(Error::validation("time range start must be non-negative"));
        }
        if end <= start {
            return Err(Error::validation(format!(
                "time range end ({end}) must be after start ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Bounds rounded to milliseconds, as stored in derived entries.
    pub fn to_millis_pair(&self) -> [f64; 2] {
        [round_millis(self.start), round_millis(self.end)]
    }
}

fn round_millis(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Crop rectangle in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl CropRect {
    pub fn validate(&self) -> Result<()> {
        if self.w == 0 || self.h == 0 {
            return Err(Error::validation("crop width and height must be positive"));
        }
        Ok(())
    }

    /// ffmpeg `crop` filter. Width and height are rounded down to even
    /// values (minimum 2) since yuv420p encoders reject odd dimensions.
    pub fn filter(&self) -> String {
        let w = self.w.max(2) & !1;
        let h = self.h.max(2) & !1;
        format!("crop={}:{}:{}:{}", w, h, self.x, self.y)
    }
}

/// Encoder settings for produced artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecParams {
    #[serde(default = "default_audio_sample_rate")]
    pub audio_sample_rate: u32,

    #[serde(default = "default_audio_channels")]
    pub audio_channels: u32,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default = "default_video_preset")]
    pub video_preset: String,

    #[serde(default = "default_video_crf")]
    pub video_crf: u32,

    #[serde(default = "default_video_audio_codec")]
    pub video_audio_codec: String,

    #[serde(default = "default_audio_bitrate")]
    pub video_audio_bitrate: String,
}

fn default_audio_sample_rate() -> u32 {
    44100
}
fn default_audio_channels() -> u32 {
    1
}
fn default_audio_bitrate() -> String {
    "192k".to_string()
}
fn default_video_codec() -> String {
    "libx264".to_string()
}
fn default_video_preset() -> String {
    "veryfast".to_string()
}
fn default_video_crf() -> u32 {
    20
}
fn default_video_audio_codec() -> String {
    "aac".to_string()
}

impl Default for CodecParams {
    fn default() -> Self {
        Self {
            audio_sample_rate: default_audio_sample_rate(),
            audio_channels: default_audio_channels(),
            audio_bitrate: default_audio_bitrate(),
            video_codec: default_video_codec(),
            video_preset: default_video_preset(),
            video_crf: default_video_crf(),
            video_audio_codec: default_video_audio_codec(),
            video_audio_bitrate: default_audio_bitrate(),
        }
    }
}

/// What a job should produce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputKind {
    /// Mono, fixed-rate audio clip for voice reference.
    ReferenceAudio,
    /// Re-encoded (never stream-copied) video clip, optionally cropped.
    Video,
    /// Full-length mp3 track for transcription.
    SpeechAudio,
    /// Stream copy from `start` to `end` (or end of input), used to cut
    /// downloaded files.
    Copy { start: f64, end: Option<f64> },
}

/// One transcode request.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub range: Option<TimeRange>,
    pub crop: Option<CropRect>,
    pub kind: OutputKind,
}

impl TranscodeJob {
    pub fn reference_audio(input: PathBuf, output: PathBuf, range: TimeRange) -> Self {
        Self {
            input,
            output,
            range: Some(range),
            crop: None,
            kind: OutputKind::ReferenceAudio,
        }
    }

    pub fn video(
        input: PathBuf,
        output: PathBuf,
        range: TimeRange,
        crop: Option<CropRect>,
    ) -> Self {
        Self {
            input,
            output,
            range: Some(range),
            crop,
            kind: OutputKind::Video,
        }
    }

    pub fn speech_audio(input: PathBuf, output: PathBuf) -> Self {
        Self {
            input,
            output,
            range: None,
            crop: None,
            kind: OutputKind::SpeechAudio,
        }
    }

    pub fn copy(input: PathBuf, output: PathBuf, start: f64, end: Option<f64>) -> Self {
        Self {
            input,
            output,
            range: None,
            crop: None,
            kind: OutputKind::Copy { start, end },
        }
    }
}

/// Something that can materialize a [`TranscodeJob`].
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Produce `job.output` or fail with the tool's diagnostics.
    async fn transcode(&self, job: &TranscodeJob) -> Result<()>;
}

/// Format seconds the way ffmpeg accepts them: `1`, `1.5`, `0.25`.
fn secs(v: f64) -> String {
    format!("{}", v)
}

/// Build the ffmpeg argument vector for `job`.
pub fn ffmpeg_args(job: &TranscodeJob, params: &CodecParams) -> Vec<String> {
    let input = job.input.to_string_lossy().to_string();
    let output = job.output.to_string_lossy().to_string();
    let mut args: Vec<String> = vec!["-y".into()];

    match job.kind {
        OutputKind::ReferenceAudio | OutputKind::Video => {
            if let Some(range) = job.range {
                args.extend(["-ss".into(), secs(range.start), "-to".into(), secs(range.end)]);
            }
            args.extend(["-i".into(), input]);
        }
        OutputKind::SpeechAudio => {
            args.extend(["-i".into(), input]);
        }
        OutputKind::Copy { start, end } => {
            args.extend(["-i".into(), input]);
            if start > 0.0 {
                args.extend(["-ss".into(), secs(start)]);
            }
            if let Some(end) = end {
                args.extend(["-to".into(), secs(end)]);
            }
        }
    }

    match job.kind {
        OutputKind::ReferenceAudio => {
            args.extend([
                "-vn".into(),
                "-ac".into(),
                params.audio_channels.to_string(),
                "-ar".into(),
                params.audio_sample_rate.to_string(),
                "-b:a".into(),
                params.audio_bitrate.clone(),
            ]);
        }
        OutputKind::Video => {
            if let Some(crop) = job.crop {
                args.extend(["-vf".into(), crop.filter()]);
            }
            args.extend([
                "-c:v".into(),
                params.video_codec.clone(),
                "-preset".into(),
                params.video_preset.clone(),
                "-crf".into(),
                params.video_crf.to_string(),
                "-c:a".into(),
                params.video_audio_codec.clone(),
                "-b:a".into(),
                params.video_audio_bitrate.clone(),
            ]);
        }
        OutputKind::SpeechAudio => {
            args.extend([
                "-vn".into(),
                "-acodec".into(),
                "libmp3lame".into(),
                "-q:a".into(),
                "2".into(),
            ]);
        }
        OutputKind::Copy { .. } => {
            args.extend(["-c".into(), "copy".into()]);
        }
    }

    args.push(output);
    args
}

/// [`Transcoder`] backed by the ffmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    params: CodecParams,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(program: PathBuf, params: CodecParams, timeout: Duration) -> Self {
        Self {
            program,
            params,
            timeout,
        }
    }

    pub fn params(&self) -> &CodecParams {
        &self.params
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, job: &TranscodeJob) -> Result<()> {
        if let Some(crop) = job.crop {
            crop.validate()?;
        }
        let args = ffmpeg_args(job, &self.params);
        tracing::info!(
            "Transcoding {} -> {} ({:?})",
            job.input.display(),
            job.output.display(),
            job.kind
        );
        ToolCommand::new(self.program.clone())
            .args(args)
            .timeout(self.timeout)
            .execute()
            .await?;
        Ok(())
    }
}
