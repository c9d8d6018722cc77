//! Dataset access for request handlers.
//!
//! A [`Dataset`] is a sandbox-confined [`MetaStore`] plus the helpers the
//! HTTP surface and CLI need: the enriched listing and media resolution.
//! [`DatasetLocks`] serializes writers per meta store; every mutating
//! handler holds its guard from first read to last write.

use clipforged_common::paths::{file_stem, normalize};
use clipforged_common::{Error, PathSandbox, Result};
use clipforged_store::{DerivedEntry, MetaEntry, MetaStore};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per meta store path.
#[derive(Debug, Clone, Default)]
pub struct DatasetLocks {
    inner: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DatasetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to the dataset rooted at `meta_path`.
    pub async fn acquire(&self, meta_path: &Path) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the shard lock is released before awaiting.
        let lock = self
            .inner
            .entry(meta_path.to_path_buf())
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Number of datasets that have been locked at least once.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// A meta store whose path has passed the sandbox.
#[derive(Debug, Clone)]
pub struct Dataset {
    store: MetaStore,
}

/// A meta entry as the listing presents it.
#[derive(Debug, Clone, Serialize)]
pub struct ListedEntry {
    #[serde(flatten)]
    pub entry: MetaEntry,
    pub meta_index: usize,
    pub resolved_media_path: Option<PathBuf>,
    pub processed_video_path: Option<PathBuf>,
    pub processed_audio_path: Option<PathBuf>,
    pub processed_audio_pos: Option<[f64; 2]>,
}

impl Dataset {
    /// Resolve `meta_path` through the sandbox and open the store pair.
    ///
    /// The derived store is the sibling named `derived_file_name`.
    pub fn open(
        sandbox: &PathSandbox,
        meta_path: impl AsRef<Path>,
        derived_file_name: &str,
    ) -> Result<Self> {
        let name = Path::new(derived_file_name);
        if name.components().count() != 1 || name.file_name().is_none() {
            return Err(Error::validation(format!(
                "derived store name must be a bare file name: {derived_file_name}"
            )));
        }
        let meta_path = sandbox.resolve(meta_path)?;
        Ok(Self {
            store: MetaStore::open(meta_path, derived_file_name),
        })
    }

    pub fn store(&self) -> &MetaStore {
        &self.store
    }

    pub fn meta_path(&self) -> &Path {
        self.store.path()
    }

    pub fn base_dir(&self) -> &Path {
        self.store.base_dir()
    }

    /// Resolve a media path stored in (or destined for) this dataset.
    /// Relative paths are taken against the meta store's directory.
    pub fn resolve_media(&self, sandbox: &PathSandbox, media_path: &str) -> Result<PathBuf> {
        sandbox.resolve_relative_to(self.meta_path(), media_path)
    }

    /// The meta entry at `index` and its resolved, existing source file.
    pub fn source_of(&self, sandbox: &PathSandbox, index: usize) -> Result<(MetaEntry, PathBuf)> {
        let entry = self.store.get(index)?;
        let source = self.resolve_media(sandbox, entry.require_media_path()?)?;
        if !source.is_file() {
            return Err(Error::not_found(source.display()));
        }
        Ok((entry, source))
    }

    /// Every meta entry with its position, resolved source path, and the
    /// artifacts of its first attached derived entry when processed.
    pub fn listing(&self, sandbox: &PathSandbox) -> Result<Vec<ListedEntry>> {
        let entries = self.store.load()?;
        let derived = self.store.derived().load()?;

        let mut first: HashMap<usize, &DerivedEntry> = HashMap::new();
        for d in &derived {
            if let Some(index) = d.meta_index {
                first.entry(index).or_insert(d);
            }
        }

        let items = entries
            .into_iter()
            .enumerate()
            .map(|(meta_index, entry)| {
                let resolved_media_path = entry
                    .media_path
                    .as_deref()
                    .and_then(|p| self.resolve_media(sandbox, p).ok());
                let attached = first.get(&meta_index).filter(|_| entry.processed);
                ListedEntry {
                    resolved_media_path,
                    processed_video_path: attached
                        .map(|d| normalize(&self.base_dir().join(&d.media_path))),
                    processed_audio_path: attached
                        .map(|d| normalize(&self.base_dir().join(&d.reference_audio_column))),
                    processed_audio_pos: attached.map(|d| d.reference_audio_pos),
                    meta_index,
                    entry,
                }
            })
            .collect();
        Ok(items)
    }
}

/// Deterministic artifact names: `<stem>_ref.mp3` and `<stem>_trim.mp4`.
pub fn artifact_names(source: &Path) -> Result<(String, String)> {
    let stem = file_stem(source)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::validation(format!("no file name in {}", source.display())))?;
    Ok((format!("{stem}_ref.mp3"), format!("{stem}_trim.mp4")))
}
