//! The derived store: processed artifacts referencing meta entries.
//!
//! The backing file is optional. Reads of a missing file see an empty store;
//! the first write creates it.

use crate::codec;
use crate::file;
use crate::models::DerivedEntry;
use clipforged_common::Result;
use std::path::{Path, PathBuf};

/// File-backed list of [`DerivedEntry`] records.
#[derive(Debug, Clone)]
pub struct DerivedStore {
    path: PathBuf,
}

impl DerivedStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw file text, `None` if it does not exist.
    pub(crate) fn read_text(&self) -> Result<Option<String>> {
        file::read_optional(&self.path)
    }

    /// All entries in store order.
    pub fn load(&self) -> Result<Vec<DerivedEntry>> {
        match self.read_text()? {
            Some(text) => codec::decode(&text),
            None => Ok(Vec::new()),
        }
    }

    /// Replace the whole store.
    pub fn save(&self, entries: &[DerivedEntry]) -> Result<()> {
        file::write_atomic(&self.path, &codec::encode(entries)?)
    }

    /// First entry referencing `meta_index`, in store order.
    pub fn find_by_meta_index(&self, meta_index: usize) -> Result<Option<DerivedEntry>> {
        Ok(self
            .load()?
            .into_iter()
            .find(|e| e.is_attached_to(meta_index)))
    }

    /// Every entry referencing `meta_index`, in store order.
    pub fn find_all_by_meta_index(&self, meta_index: usize) -> Result<Vec<DerivedEntry>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|e| e.is_attached_to(meta_index))
            .collect())
    }

    /// Append one entry, creating the file if needed.
    pub fn append(&self, entry: DerivedEntry) -> Result<()> {
        let mut entries = self.load()?;
        entries.push(entry);
        self.save(&entries)
    }

    /// Apply `updater` to every entry matching `predicate`.
    ///
    /// Returns how many entries matched. Nothing is written when none do.
    pub fn replace<P, U>(&self, predicate: P, mut updater: U) -> Result<usize>
    where
        P: Fn(&DerivedEntry) -> bool,
        U: FnMut(&mut DerivedEntry),
    {
        let mut entries = self.load()?;
        let mut matched = 0;
        for entry in entries.iter_mut().filter(|e| predicate(e)) {
            updater(entry);
            matched += 1;
        }
        if matched > 0 {
            self.save(&entries)?;
        }
        Ok(matched)
    }

    /// Drop every entry matching `predicate`. Returns how many were removed.
    pub fn remove_where<P>(&self, predicate: P) -> Result<usize>
    where
        P: Fn(&DerivedEntry) -> bool,
    {
        let mut entries = self.load()?;
        let before = entries.len();
        entries.retain(|e| !predicate(e));
        let removed = before - entries.len();
        if removed > 0 {
            self.save(&entries)?;
        }
        Ok(removed)
    }
}
