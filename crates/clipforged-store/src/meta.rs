//! The meta store: the authoritative ordered list of source clips.
//!
//! Position is identity, so insert and delete move every later entry. The
//! store owns its sibling [`DerivedStore`] and rewrites derived references as
//! part of every structural edit; a caller reading both files after a call
//! returns never sees them disagree.
//!
//! Every operation is a whole-file read, an in-memory change, and a
//! whole-file atomic write. Callers serialize writers (see the server's
//! dataset lock table); the store itself does not lock.

use crate::codec;
use crate::derived::DerivedStore;
use crate::file;
use crate::models::{DerivedEntry, EntryPatch, MetaEntry};
use crate::reconcile::{reconcile, StructuralEdit};
use clipforged_common::{Error, Result};
use std::path::{Path, PathBuf};

/// File-backed list of [`MetaEntry`] records plus its derived store.
#[derive(Debug, Clone)]
pub struct MetaStore {
    path: PathBuf,
    derived: DerivedStore,
}

impl MetaStore {
    /// Open the meta store at `path` with the derived store named
    /// `derived_file_name` in the same directory. No I/O happens here.
    pub fn open(path: impl Into<PathBuf>, derived_file_name: &str) -> Self {
        let path = path.into();
        let derived_path = path
            .parent()
            .map(|dir| dir.join(derived_file_name))
            .unwrap_or_else(|| PathBuf::from(derived_file_name));
        Self::with_derived(path, DerivedStore::new(derived_path))
    }

    pub fn with_derived(path: impl Into<PathBuf>, derived: DerivedStore) -> Self {
        Self {
            path: path.into(),
            derived,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding both store files; derived paths are relative to it.
    pub fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn derived(&self) -> &DerivedStore {
        &self.derived
    }

    /// All entries; an entry's position is its index in the returned list.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the store file does not exist,
    /// [`Error::MalformedRecord`] if any line fails to parse.
    pub fn load(&self) -> Result<Vec<MetaEntry>> {
        codec::decode(&file::read_required(&self.path)?)
    }

    fn load_with_text(&self, allow_missing: bool) -> Result<(Option<String>, Vec<MetaEntry>)> {
        let text = if allow_missing {
            file::read_optional(&self.path)?
        } else {
            Some(file::read_required(&self.path)?)
        };
        let entries = match text {
            Some(ref t) => codec::decode(t)?,
            None => Vec::new(),
        };
        Ok((text, entries))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.load()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The entry at position `index`.
    pub fn get(&self, index: usize) -> Result<MetaEntry> {
        let entries = self.load()?;
        let len = entries.len();
        entries
            .into_iter()
            .nth(index)
            .ok_or(Error::IndexOutOfRange { index, len })
    }

    /// Merge `patch` into the entry at `index`, leaving the derived store alone.
    pub fn update_fields(&self, index: usize, patch: &EntryPatch) -> Result<MetaEntry> {
        let mut entries = self.load()?;
        let len = entries.len();
        let entry = entries
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })?;
        patch.apply_to_meta(entry);
        let updated = entry.clone();
        file::write_atomic(&self.path, &codec::encode(&entries)?)?;
        Ok(updated)
    }

    /// Merge `patch` into the entry at `index` and into every derived entry
    /// attached to it, as one change.
    ///
    /// Returns the updated meta entry and the number of derived entries touched.
    pub fn update_with_derived(
        &self,
        index: usize,
        patch: &EntryPatch,
    ) -> Result<(MetaEntry, usize)> {
        let (meta_text, mut entries) = self.load_with_text(false)?;
        let len = entries.len();
        let entry = entries
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })?;
        patch.apply_to_meta(entry);
        let updated = entry.clone();

        let mut derived = self.derived.load()?;
        let mut touched = 0;
        if patch.touches_derived() {
            for d in derived.iter_mut().filter(|d| d.is_attached_to(index)) {
                patch.apply_to_derived(d);
                touched += 1;
            }
        }

        let meta_new = codec::encode(&entries)?;
        if touched == 0 {
            file::write_atomic(&self.path, &meta_new)?;
        } else {
            file::write_pair(
                (&self.path, &meta_new, meta_text.as_deref()),
                (self.derived.path(), &codec::encode(&derived)?),
            )?;
        }

        tracing::debug!(
            "Updated entry {} in {} ({} derived entries synced)",
            index,
            self.path.display(),
            touched
        );
        Ok((updated, touched))
    }

    /// Insert `entry` at `index + 1`, shifting later entries and derived
    /// references up by one. Returns the new position.
    pub fn insert_after(&self, index: usize, entry: MetaEntry) -> Result<usize> {
        let (meta_text, mut entries) = self.load_with_text(false)?;
        if index >= entries.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: entries.len(),
            });
        }
        let at = index + 1;
        entries.insert(at, entry);
        self.commit_structural(StructuralEdit::Insert { at }, meta_text, &entries)?;
        tracing::info!("Inserted entry at {} in {}", at, self.path.display());
        Ok(at)
    }

    /// Append `entry` at the end, creating the store if needed.
    /// Returns the new position.
    pub fn append(&self, entry: MetaEntry) -> Result<usize> {
        let (meta_text, mut entries) = self.load_with_text(true)?;
        let at = entries.len();
        entries.push(entry);
        self.commit_structural(StructuralEdit::Insert { at }, meta_text, &entries)?;
        tracing::info!("Appended entry at {} in {}", at, self.path.display());
        Ok(at)
    }

    /// Remove the entry at `index`, dropping derived entries that referenced
    /// it and shifting later references down by one. Returns the removed entry.
    pub fn delete_at(&self, index: usize) -> Result<MetaEntry> {
        let (meta_text, mut entries) = self.load_with_text(false)?;
        if index >= entries.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: entries.len(),
            });
        }
        let removed = entries.remove(index);
        self.commit_structural(StructuralEdit::Delete { at: index }, meta_text, &entries)?;
        tracing::info!("Deleted entry {} from {}", index, self.path.display());
        Ok(removed)
    }

    /// Record a processed artifact for the entry at `index` and mark it
    /// processed, as one change.
    ///
    /// With `replace_existing`, earlier derived entries for the same index
    /// are dropped in the same write; otherwise the new entry is appended
    /// alongside them.
    pub fn attach_derived(
        &self,
        index: usize,
        entry: DerivedEntry,
        replace_existing: bool,
    ) -> Result<DerivedEntry> {
        entry.validate()?;
        if !entry.is_attached_to(index) {
            return Err(Error::Internal(format!(
                "derived entry references {:?} but was attached to {}",
                entry.meta_index, index
            )));
        }

        let (_, mut entries) = self.load_with_text(false)?;
        let len = entries.len();
        entries
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })?
            .processed = true;

        let derived_text = self.derived.read_text()?;
        let mut derived: Vec<DerivedEntry> = match derived_text {
            Some(ref t) => codec::decode(t)?,
            None => Vec::new(),
        };
        if replace_existing {
            derived.retain(|d| !d.is_attached_to(index));
        }
        derived.push(entry.clone());

        // Derived first: a failed meta write leaves no orphaned artifact record.
        file::write_pair(
            (
                self.derived.path(),
                &codec::encode(&derived)?,
                derived_text.as_deref(),
            ),
            (&self.path, &codec::encode(&entries)?),
        )?;

        tracing::info!(
            "Recorded derived entry for {} in {}",
            index,
            self.derived.path().display()
        );
        Ok(entry)
    }

    fn commit_structural(
        &self,
        edit: StructuralEdit,
        meta_text: Option<String>,
        entries: &[MetaEntry],
    ) -> Result<()> {
        // Parse the derived store before touching anything so a corrupt file
        // aborts the whole edit.
        let derived = self.derived.load()?;
        let reconciled = reconcile(edit, derived.clone());
        let meta_new = codec::encode(entries)?;

        if reconciled == derived {
            return file::write_atomic(&self.path, &meta_new);
        }

        tracing::debug!(
            "Reconciling {} for {:?}",
            self.derived.path().display(),
            edit
        );
        file::write_pair(
            (&self.path, &meta_new, meta_text.as_deref()),
            (self.derived.path(), &codec::encode(&reconciled)?),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CaptureType;
    use serde_json::Map;
    use tempfile::TempDir;

    fn derived(meta_index: usize) -> DerivedEntry {
        DerivedEntry {
            meta_index: Some(meta_index),
            media_path: format!("v{meta_index}.mp4"),
            caption: String::new(),
            speech: None,
            reference_audio_column: format!("a{meta_index}.mp3"),
            reference_audio_pos: [0.0, 1.0],
            caption_capture_type: None,
            extra: Map::new(),
        }
    }

    fn setup(n: usize) -> (TempDir, MetaStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::open(dir.path().join("dataset_meta.jsonl"), "dataset.jsonl");
        let entries: Vec<_> = (0..n)
            .map(|i| MetaEntry::with_media_path(format!("clip{i}.mp4")))
            .collect();
        file::write_atomic(store.path(), &codec::encode(&entries).unwrap()).unwrap();
        (dir, store)
    }

    fn paths(store: &MetaStore) -> Vec<String> {
        store
            .load()
            .unwrap()
            .into_iter()
            .map(|e| e.media_path.unwrap())
            .collect()
    }

    fn derived_indices(store: &MetaStore) -> Vec<usize> {
        store
            .derived()
            .load()
            .unwrap()
            .into_iter()
            .filter_map(|e| e.meta_index)
            .collect()
    }

    #[test]
    fn get_out_of_range() {
        let (_dir, store) = setup(2);
        assert!(store.get(1).is_ok());
        assert!(matches!(
            store.get(2),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn load_missing_store_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::open(dir.path().join("missing.jsonl"), "dataset.jsonl");
        assert!(matches!(store.load(), Err(Error::NotFound(_))));
    }

    #[test]
    fn derived_store_is_sibling() {
        let store = MetaStore::open("/srv/data/set/dataset_meta.jsonl", "dataset.jsonl");
        assert_eq!(
            store.derived().path(),
            Path::new("/srv/data/set/dataset.jsonl")
        );
        assert_eq!(store.base_dir(), Path::new("/srv/data/set"));
    }

    #[test]
    fn update_fields_leaves_others() {
        let (_dir, store) = setup(3);
        let updated = store
            .update_fields(1, &EntryPatch::default().caption("hello"))
            .unwrap();
        assert_eq!(updated.caption.as_deref(), Some("hello"));
        let entries = store.load().unwrap();
        assert_eq!(entries[0].caption, None);
        assert_eq!(entries[1].caption.as_deref(), Some("hello"));
        assert_eq!(entries[2].caption, None);
    }

    #[test]
    fn insert_after_shifts_derived_references() {
        let (_dir, store) = setup(4);
        store
            .derived()
            .save(&[derived(0), derived(1), derived(2), derived(3)])
            .unwrap();

        let at = store
            .insert_after(1, MetaEntry::with_media_path("new.mp4"))
            .unwrap();

        assert_eq!(at, 2);
        assert_eq!(
            paths(&store),
            vec!["clip0.mp4", "clip1.mp4", "new.mp4", "clip2.mp4", "clip3.mp4"]
        );
        assert_eq!(derived_indices(&store), vec![0, 1, 3, 4]);
        // Each reference still points at the same clip.
        for d in store.derived().load().unwrap() {
            let meta = store.get(d.meta_index.unwrap()).unwrap();
            let n = d.media_path.trim_start_matches('v').trim_end_matches(".mp4");
            assert_eq!(meta.media_path.unwrap(), format!("clip{n}.mp4"));
        }
    }

    #[test]
    fn delete_removes_and_shifts_derived_references() {
        let (_dir, store) = setup(4);
        store
            .derived()
            .save(&[derived(0), derived(2), derived(3), derived(2)])
            .unwrap();

        let removed = store.delete_at(2).unwrap();

        assert_eq!(removed.media_path.as_deref(), Some("clip2.mp4"));
        assert_eq!(paths(&store), vec!["clip0.mp4", "clip1.mp4", "clip3.mp4"]);
        assert_eq!(derived_indices(&store), vec![0, 2]);
    }

    #[test]
    fn delete_out_of_range_writes_nothing() {
        let (_dir, store) = setup(2);
        let before = std::fs::read_to_string(store.path()).unwrap();
        assert!(store.delete_at(5).is_err());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn insert_then_delete_restores_sequence() {
        for i in 0..3 {
            let (_dir, store) = setup(3);
            store.derived().save(&[derived(0), derived(2)]).unwrap();
            let before = store.load().unwrap();
            let before_derived = store.derived().load().unwrap();

            let at = store
                .insert_after(i, MetaEntry::with_media_path("x.mp4"))
                .unwrap();
            store.delete_at(at).unwrap();

            assert_eq!(store.load().unwrap(), before);
            assert_eq!(store.derived().load().unwrap(), before_derived);
        }
    }

    #[test]
    fn structural_edit_without_derived_store_does_not_create_it() {
        let (_dir, store) = setup(2);
        store.insert_after(0, MetaEntry::with_media_path("x.mp4")).unwrap();
        store.delete_at(0).unwrap();
        assert!(!store.derived().path().exists());
    }

    #[test]
    fn corrupt_derived_store_aborts_structural_edit() {
        let (_dir, store) = setup(2);
        std::fs::write(store.derived().path(), "{broken\n").unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();

        let err = store.delete_at(0).unwrap_err();

        assert!(matches!(err, Error::MalformedRecord { line: 1, .. }));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn append_creates_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::open(dir.path().join("dataset_meta.jsonl"), "dataset.jsonl");
        assert_eq!(store.append(MetaEntry::with_media_path("a.mp4")).unwrap(), 0);
        assert_eq!(store.append(MetaEntry::with_media_path("b.mp4")).unwrap(), 1);
        assert_eq!(paths(&store), vec!["a.mp4", "b.mp4"]);
    }

    #[test]
    fn attach_derived_marks_processed() {
        let (_dir, store) = setup(2);
        let mut entry = derived(1);
        entry.reference_audio_pos = [1.0, 3.0];

        store.attach_derived(1, entry.clone(), false).unwrap();
        store.attach_derived(1, entry.clone(), false).unwrap();

        assert!(store.get(1).unwrap().processed);
        assert!(!store.get(0).unwrap().processed);
        assert_eq!(derived_indices(&store), vec![1, 1]);

        store.attach_derived(1, entry, true).unwrap();
        assert_eq!(derived_indices(&store), vec![1]);
    }

    #[test]
    fn attach_derived_rejects_bad_span() {
        let (_dir, store) = setup(1);
        let mut entry = derived(0);
        entry.reference_audio_pos = [3.0, 1.0];
        assert!(store.attach_derived(0, entry, false).is_err());
        assert!(!store.derived().path().exists());
        assert!(!store.get(0).unwrap().processed);
    }

    #[test]
    fn update_with_derived_syncs_every_attached_entry() {
        let (_dir, store) = setup(2);
        store
            .derived()
            .save(&[derived(0), derived(1), derived(0)])
            .unwrap();

        let patch = EntryPatch::default()
            .caption("a dog")
            .speech("woof")
            .capture_type(CaptureType::Manual);
        let (meta, touched) = store.update_with_derived(0, &patch).unwrap();

        assert_eq!(touched, 2);
        assert_eq!(meta.caption.as_deref(), Some("a dog"));
        for d in store.derived().load().unwrap() {
            if d.is_attached_to(0) {
                assert_eq!(d.caption, "a dog");
                assert_eq!(d.speech.as_deref(), Some("woof"));
                assert_eq!(d.caption_capture_type, Some(CaptureType::Manual));
            } else {
                assert_eq!(d.caption, "");
                assert_eq!(d.caption_capture_type, None);
            }
        }
    }

    #[test]
    fn unattached_derived_entries_survive_edits() {
        let (_dir, store) = setup(3);
        let legacy = DerivedEntry {
            meta_index: None,
            ..derived(0)
        };
        store
            .derived()
            .save(&[legacy.clone(), derived(1)])
            .unwrap();

        store.insert_after(0, MetaEntry::with_media_path("x.mp4")).unwrap();
        store.delete_at(0).unwrap();
        store
            .update_with_derived(0, &EntryPatch::default().caption("new"))
            .unwrap();
        store.attach_derived(0, derived(0), true).unwrap();

        let derived = store.derived().load().unwrap();
        assert_eq!(derived.len(), 3);
        assert_eq!(derived[0], legacy);
        assert_eq!(derived_indices(&store), vec![1, 0]);
    }
}
