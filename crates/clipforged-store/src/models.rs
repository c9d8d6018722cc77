//! Record types stored in the meta and derived stores.
//!
//! Both record types keep any fields they do not model in `extra`, so a
//! read-modify-write cycle never drops keys written by other tools.

use clipforged_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Time window requested when a clip was downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRange {
    pub start: String,
    pub end: String,
}

/// One source clip. Identity is its position in the meta store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech: Option<String>,

    #[serde(default)]
    pub processed: bool,

    /// Position of the entry this one was duplicated from, at copy time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copied_from: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_range: Option<DownloadRange>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MetaEntry {
    /// A fresh, unprocessed entry for a media file.
    pub fn with_media_path(media_path: impl Into<String>) -> Self {
        Self {
            media_path: Some(media_path.into()),
            ..Default::default()
        }
    }

    /// The entry a "copy" operation inserts for the entry at `position`.
    ///
    /// Only the media path, caption, and source URL carry over; the copy
    /// starts unprocessed and remembers where it came from.
    pub fn duplicate(&self, position: usize) -> Self {
        Self {
            media_path: self.media_path.clone(),
            caption: Some(self.caption.clone().unwrap_or_default()),
            source_url: self.source_url.clone(),
            processed: false,
            copied_from: Some(position),
            ..Default::default()
        }
    }

    /// The media path, or [`Error::MissingField`] if unset or blank.
    pub fn require_media_path(&self) -> Result<&str> {
        self.media_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| Error::missing_field("media_path"))
    }
}

/// How a derived entry's caption was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureType {
    Manual,
    Ai,
}

/// One processed artifact pointing at a meta entry by position.
///
/// Records written by older tooling carry no `meta_index`. They stay in the
/// store untouched but are never matched, shifted, or reported as dangling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_index: Option<usize>,

    /// Trimmed video, or the source itself when no video trim was requested.
    pub media_path: String,

    #[serde(default)]
    pub caption: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech: Option<String>,

    pub reference_audio_column: String,

    /// `[start, end]` seconds of the reference-audio clip.
    pub reference_audio_pos: [f64; 2],

    #[serde(
        rename = "captionCaptureType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub caption_capture_type: Option<CaptureType>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DerivedEntry {
    /// Whether this entry references the meta entry at `index`.
    pub fn is_attached_to(&self, index: usize) -> bool {
        self.meta_index == Some(index)
    }

    /// Check the reference-audio span: finite, non-negative, start < end.
    pub fn validate(&self) -> Result<()> {
        let [start, end] = self.reference_audio_pos;
        if !start.is_finite() || !end.is_finite() {
            return Err(Error::validation("reference_audio_pos must be finite"));
        }
        if start < 0.0 {
            return Err(Error::validation("reference_audio_pos must be non-negative"));
        }
        if start >= end {
            return Err(Error::validation(
                "reference_audio_pos start must be before end",
            ));
        }
        Ok(())
    }
}

/// Partial update applied to a meta entry and the derived entries attached
/// to it. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryPatch {
    pub caption: Option<String>,
    pub speech: Option<String>,
    pub processed: Option<bool>,
    pub capture_type: Option<CaptureType>,
}

impl EntryPatch {
    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn speech(mut self, speech: impl Into<String>) -> Self {
        self.speech = Some(speech.into());
        self
    }

    pub fn processed(mut self, processed: bool) -> Self {
        self.processed = Some(processed);
        self
    }

    pub fn capture_type(mut self, capture_type: CaptureType) -> Self {
        self.capture_type = Some(capture_type);
        self
    }

    pub fn apply_to_meta(&self, entry: &mut MetaEntry) {
        if let Some(ref caption) = self.caption {
            entry.caption = Some(caption.clone());
        }
        if let Some(ref speech) = self.speech {
            entry.speech = Some(speech.clone());
        }
        if let Some(processed) = self.processed {
            entry.processed = processed;
        }
    }

    /// Whether applying this patch could change a derived entry.
    pub fn touches_derived(&self) -> bool {
        self.caption.is_some() || self.speech.is_some() || self.capture_type.is_some()
    }

    pub fn apply_to_derived(&self, entry: &mut DerivedEntry) {
        if let Some(ref caption) = self.caption {
            entry.caption = caption.clone();
        }
        if let Some(ref speech) = self.speech {
            entry.speech = Some(speech.clone());
        }
        if let Some(capture_type) = self.capture_type {
            entry.caption_capture_type = Some(capture_type);
        }
    }
}
