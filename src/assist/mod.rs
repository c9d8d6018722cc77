//! AI captioning and transcription.
//!
//! Handlers talk to a [`CaptionService`]; the production implementation is
//! [`ReplicateClient`]. Both calls return plain text or fail with
//! [`Error::Tool`](clipforged_common::Error::Tool) for a failed job and
//! [`Error::ToolTimeout`](clipforged_common::Error::ToolTimeout) when the
//! job does not finish within the poll budget.

mod replicate;

pub use replicate::{normalize_output, Prediction, ReplicateClient};

use clipforged_common::Result;

/// Remote service that turns media bytes into text.
#[async_trait::async_trait]
pub trait CaptionService: Send + Sync {
    /// Describe a video clip.
    async fn caption(&self, media: &[u8], mime: &str) -> Result<String>;

    /// Transcribe speech from an mp3 track.
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;
}
