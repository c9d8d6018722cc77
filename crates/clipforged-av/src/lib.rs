//! # clipforged-av
//!
//! External media tool invocation for clipforged.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`MediaTool`]) -- find ffmpeg and yt-dlp and report
//!   their versions.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support for running external processes.
//! - **Transcoding** ([`Transcoder`], [`FfmpegTranscoder`]) -- trim, crop,
//!   and re-encode clips; extract reference audio.
//!
//! Media bytes are never decoded here; ffmpeg is a black box that either
//! produces the output file or fails with diagnostics.

pub mod command;
pub mod tools;
pub mod transcode;

pub use command::{ToolCommand, ToolOutput};
pub use tools::{MediaTool, ToolStatus};
pub use transcode::{
    CodecParams, CropRect, FfmpegTranscoder, OutputKind, TimeRange, TranscodeJob, Transcoder,
};
