//! Trim and crop of dataset entries into training artifacts.
//!
//! A trim extracts a reference-audio clip and, optionally, a re-encoded
//! (and optionally cropped) video clip from an entry's source, then records
//! them as a derived entry. Every tool invocation finishes before the stores
//! are touched, so a tool failure leaves both stores as they were.

use crate::dataset::{artifact_names, Dataset};
use clipforged_av::{CropRect, TimeRange, TranscodeJob, Transcoder};
use clipforged_common::paths::relative_to;
use clipforged_common::{Error, PathSandbox, Result};
use clipforged_store::DerivedEntry;
use serde_json::Map;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Parameters of one trim.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimRequest {
    pub index: usize,
    /// Span of the reference-audio clip.
    pub reference: TimeRange,
    /// Span of the video clip; no video is produced without it.
    pub video: Option<TimeRange>,
    pub crop: Option<CropRect>,
    /// Output root, relative to the meta store's directory when relative.
    pub output_dir: Option<String>,
}

/// What a successful trim produced.
#[derive(Debug, Clone)]
pub struct TrimOutcome {
    pub audio: PathBuf,
    pub video: Option<PathBuf>,
    pub dataset_path: PathBuf,
    pub entry: DerivedEntry,
}

#[derive(Debug, Clone)]
pub struct TrimOptions {
    /// Default output root under the meta store's directory.
    pub processed_dir: String,
    pub replace_existing: bool,
}

impl Default for TrimOptions {
    fn default() -> Self {
        Self {
            processed_dir: "dataset_processed".to_string(),
            replace_existing: false,
        }
    }
}

pub struct TrimEngine {
    sandbox: Arc<PathSandbox>,
    transcoder: Arc<dyn Transcoder>,
    options: TrimOptions,
}

impl TrimEngine {
    pub fn new(
        sandbox: Arc<PathSandbox>,
        transcoder: Arc<dyn Transcoder>,
        options: TrimOptions,
    ) -> Self {
        Self {
            sandbox,
            transcoder,
            options,
        }
    }

    /// Run a trim against `dataset`.
    ///
    /// The caller holds the dataset's write lock for the whole call, so the
    /// entry read here is still at `request.index` when the derived entry
    /// is attached.
    pub async fn trim(&self, dataset: &Dataset, request: &TrimRequest) -> Result<TrimOutcome> {
        if let Some(crop) = &request.crop {
            crop.validate()?;
            if request.video.is_none() {
                return Err(Error::validation("crop requires a video range"));
            }
        }
        let reference_audio_pos = request.reference.to_millis_pair();
        if reference_audio_pos[0] >= reference_audio_pos[1] {
            return Err(Error::validation(
                "reference audio range is shorter than one millisecond",
            ));
        }

        let (entry, source) = dataset.source_of(&self.sandbox, request.index)?;
        let (audio_name, video_name) = artifact_names(&source)?;

        let out_root = self.output_root(dataset, request.output_dir.as_deref())?;
        let audio_path = out_root.join("audio").join(audio_name);
        tokio::fs::create_dir_all(out_root.join("audio")).await?;

        tracing::info!(
            "Trimming entry {} of {} ({:.3}-{:.3}s)",
            request.index,
            dataset.meta_path().display(),
            request.reference.start,
            request.reference.end
        );

        self.transcoder
            .transcode(&TranscodeJob::reference_audio(
                source.clone(),
                audio_path.clone(),
                request.reference,
            ))
            .await?;

        let video_path = match request.video {
            Some(range) => {
                let path = out_root.join("video").join(video_name);
                tokio::fs::create_dir_all(out_root.join("video")).await?;
                self.transcoder
                    .transcode(&TranscodeJob::video(
                        source.clone(),
                        path.clone(),
                        range,
                        request.crop,
                    ))
                    .await?;
                Some(path)
            }
            None => None,
        };

        let base = dataset.base_dir();
        let media_path = path_string(&relative_to(
            base,
            video_path.as_ref().unwrap_or(&source),
        ));
        let derived = DerivedEntry {
            meta_index: Some(request.index),
            media_path,
            caption: entry.caption.clone().unwrap_or_default(),
            speech: entry.speech.clone(),
            reference_audio_column: path_string(&relative_to(base, &audio_path)),
            reference_audio_pos,
            caption_capture_type: None,
            extra: Map::new(),
        };

        let entry = dataset.store().attach_derived(
            request.index,
            derived,
            self.options.replace_existing,
        )?;

        Ok(TrimOutcome {
            audio: audio_path,
            video: video_path,
            dataset_path: dataset.store().derived().path().to_path_buf(),
            entry,
        })
    }

    fn output_root(&self, dataset: &Dataset, output_dir: Option<&str>) -> Result<PathBuf> {
        match output_dir.map(str::trim).filter(|d| !d.is_empty()) {
            Some(dir) => self.sandbox.resolve_relative_to(dataset.meta_path(), dir),
            None => self
                .sandbox
                .resolve(dataset.base_dir().join(&self.options.processed_dir)),
        }
    }
}

/// Store paths with forward slashes regardless of platform.
fn path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Writes a placeholder output for every job and records it.
    #[derive(Default)]
    struct RecordingTranscoder {
        jobs: Mutex<Vec<TranscodeJob>>,
        fail_video: bool,
    }

    #[async_trait]
    impl Transcoder for RecordingTranscoder {
        async fn transcode(&self, job: &TranscodeJob) -> Result<()> {
            self.jobs.lock().unwrap().push(job.clone());
            if self.fail_video && job.kind == clipforged_av::OutputKind::Video {
                return Err(Error::tool("ffmpeg", "Invalid data found when processing input"));
            }
            std::fs::write(&job.output, b"out")?;
            Ok(())
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        dataset: Dataset,
        sandbox: Arc<PathSandbox>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("clips")).unwrap();
        std::fs::write(dir.path().join("clips/a.mp4"), b"video").unwrap();
        std::fs::write(
            dir.path().join("meta.jsonl"),
            "{\"media_path\":\"clips/a.mp4\",\"caption\":\"a dog\"}\n{\"caption\":\"no media\"}\n",
        )
        .unwrap();
        let sandbox = Arc::new(PathSandbox::new(dir.path()).unwrap());
        let dataset = Dataset::open(&sandbox, "meta.jsonl", "dataset.jsonl").unwrap();
        Fixture {
            dir,
            dataset,
            sandbox,
        }
    }

    fn request(video: Option<TimeRange>, crop: Option<CropRect>) -> TrimRequest {
        TrimRequest {
            index: 0,
            reference: TimeRange::new(1.0, 3.0).unwrap(),
            video,
            crop,
            output_dir: None,
        }
    }

    #[tokio::test]
    async fn audio_only_trim_mirrors_source() {
        let f = fixture();
        let transcoder = Arc::new(RecordingTranscoder::default());
        let engine = TrimEngine::new(f.sandbox.clone(), transcoder.clone(), TrimOptions::default());

        let outcome = engine.trim(&f.dataset, &request(None, None)).await.unwrap();

        assert!(outcome.video.is_none());
        assert!(outcome.audio.ends_with("dataset_processed/audio/a_ref.mp3"));
        assert_eq!(outcome.entry.media_path, "clips/a.mp4");
        assert_eq!(
            outcome.entry.reference_audio_column,
            "dataset_processed/audio/a_ref.mp3"
        );
        assert_eq!(outcome.entry.reference_audio_pos, [1.0, 3.0]);
        assert_eq!(outcome.entry.caption, "a dog");
        assert_eq!(transcoder.jobs.lock().unwrap().len(), 1);
        assert!(f.dataset.store().get(0).unwrap().processed);
    }

    #[tokio::test]
    async fn absolute_source_is_stored_relative() {
        let f = fixture();
        let absolute = f.dir.path().join("clips/a.mp4");
        let line = serde_json::json!({"media_path": absolute, "caption": "a dog"});
        std::fs::write(f.dir.path().join("meta.jsonl"), format!("{line}\n")).unwrap();
        let engine = TrimEngine::new(
            f.sandbox.clone(),
            Arc::new(RecordingTranscoder::default()),
            TrimOptions::default(),
        );

        let outcome = engine.trim(&f.dataset, &request(None, None)).await.unwrap();

        assert_eq!(outcome.entry.media_path, "clips/a.mp4");
        let stored = f.dataset.store().derived().load().unwrap();
        assert_eq!(stored[0].media_path, "clips/a.mp4");
    }

    #[tokio::test]
    async fn video_trim_with_crop() {
        let f = fixture();
        let transcoder = Arc::new(RecordingTranscoder::default());
        let engine = TrimEngine::new(f.sandbox.clone(), transcoder.clone(), TrimOptions::default());
        let crop = CropRect { x: 0, y: 0, w: 100, h: 50 };

        let outcome = engine
            .trim(
                &f.dataset,
                &request(Some(TimeRange::new(0.5, 4.0).unwrap()), Some(crop)),
            )
            .await
            .unwrap();

        assert_eq!(outcome.entry.media_path, "dataset_processed/video/a_trim.mp4");
        let jobs = transcoder.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].crop, Some(crop));
        assert_eq!(jobs[1].range, Some(TimeRange::new(0.5, 4.0).unwrap()));
    }

    #[tokio::test]
    async fn tool_failure_leaves_stores_untouched() {
        let f = fixture();
        let before = std::fs::read_to_string(f.dir.path().join("meta.jsonl")).unwrap();
        let transcoder = Arc::new(RecordingTranscoder {
            fail_video: true,
            ..Default::default()
        });
        let engine = TrimEngine::new(f.sandbox.clone(), transcoder, TrimOptions::default());

        let err = engine
            .trim(&f.dataset, &request(Some(TimeRange::new(0.0, 2.0).unwrap()), None))
            .await
            .unwrap_err();

        assert!(err.is_tool_failure());
        assert!(err.to_string().contains("Invalid data"));
        assert_eq!(
            std::fs::read_to_string(f.dir.path().join("meta.jsonl")).unwrap(),
            before
        );
        assert!(!f.dir.path().join("dataset.jsonl").exists());
    }

    #[tokio::test]
    async fn crop_without_video_is_rejected() {
        let f = fixture();
        let transcoder = Arc::new(RecordingTranscoder::default());
        let engine = TrimEngine::new(f.sandbox.clone(), transcoder.clone(), TrimOptions::default());
        let crop = CropRect { x: 0, y: 0, w: 10, h: 10 };

        let err = engine.trim(&f.dataset, &request(None, Some(crop))).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(transcoder.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_media_path() {
        let f = fixture();
        let engine = TrimEngine::new(
            f.sandbox.clone(),
            Arc::new(RecordingTranscoder::default()),
            TrimOptions::default(),
        );
        let mut req = request(None, None);
        req.index = 1;
        let err = engine.trim(&f.dataset, &req).await.unwrap_err();
        assert!(matches!(err, Error::MissingField(_)));
    }

    #[tokio::test]
    async fn output_dir_is_confined() {
        let f = fixture();
        let engine = TrimEngine::new(
            f.sandbox.clone(),
            Arc::new(RecordingTranscoder::default()),
            TrimOptions::default(),
        );
        let mut req = request(None, None);
        req.output_dir = Some("../../elsewhere".to_string());
        let err = engine.trim(&f.dataset, &req).await.unwrap_err();
        assert!(matches!(err, Error::OutsideRoot { .. }));
    }

    #[tokio::test]
    async fn second_trim_appends_or_replaces() {
        let f = fixture();
        let append = TrimEngine::new(
            f.sandbox.clone(),
            Arc::new(RecordingTranscoder::default()),
            TrimOptions::default(),
        );
        append.trim(&f.dataset, &request(None, None)).await.unwrap();
        append.trim(&f.dataset, &request(None, None)).await.unwrap();
        assert_eq!(f.dataset.store().derived().load().unwrap().len(), 2);

        let replace = TrimEngine::new(
            f.sandbox.clone(),
            Arc::new(RecordingTranscoder::default()),
            TrimOptions {
                replace_existing: true,
                ..Default::default()
            },
        );
        replace.trim(&f.dataset, &request(None, None)).await.unwrap();
        assert_eq!(f.dataset.store().derived().load().unwrap().len(), 1);
    }
}
