//! Index reconciliation between the meta store and the derived store.
//!
//! Derived entries address meta entries by position, so every structural
//! edit to the meta store has to rewrite those positions. The rules here are
//! pure; [`crate::MetaStore`] applies them and persists the result in the
//! same operation as the meta edit.

use crate::models::DerivedEntry;

/// A structural edit to the meta store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralEdit {
    /// A new entry now occupies position `at`; everything from `at` moved up.
    Insert { at: usize },
    /// The entry at `at` is gone; everything after it moved down.
    Delete { at: usize },
}

/// Rewrite derived references for `edit`.
///
/// - Insert at `p`: every `meta_index >= p` is incremented.
/// - Delete at `p`: entries with `meta_index == p` are removed, every
///   `meta_index > p` is decremented.
///
/// Entries without a `meta_index` pass through unchanged. Store order is
/// preserved.
pub fn reconcile(edit: StructuralEdit, entries: Vec<DerivedEntry>) -> Vec<DerivedEntry> {
    match edit {
        StructuralEdit::Insert { at } => entries
            .into_iter()
            .map(|mut e| {
                if let Some(i) = e.meta_index.as_mut().filter(|i| **i >= at) {
                    *i += 1;
                }
                e
            })
            .collect(),
        StructuralEdit::Delete { at } => entries
            .into_iter()
            .filter(|e| !e.is_attached_to(at))
            .map(|mut e| {
                if let Some(i) = e.meta_index.as_mut().filter(|i| **i > at) {
                    *i -= 1;
                }
                e
            })
            .collect(),
    }
}

/// A derived entry whose reference does not address a live meta entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    /// Position of the derived entry in its own store.
    pub position: usize,
    pub meta_index: usize,
}

/// Find derived entries pointing past the end of a meta store of `meta_len`.
pub fn dangling(entries: &[DerivedEntry], meta_len: usize) -> Vec<DanglingReference> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(position, e)| match e.meta_index {
            Some(meta_index) if meta_index >= meta_len => Some(DanglingReference {
                position,
                meta_index,
            }),
            _ => None,
        })
        .collect()
}
