//! Clipforged-Store: file-backed record stores for a curated dataset.
//!
//! A dataset is two sibling line-delimited JSON files:
//!
//! - the **meta store** (`dataset_meta.jsonl` by convention), the authoritative
//!   ordered list of source clips where position is identity
//! - the **derived store** (`dataset.jsonl`), processed artifacts that point
//!   back into the meta store by position
//!
//! # Modules
//!
//! - `codec` - one JSON record per line, blank lines ignored
//! - `models` - [`MetaEntry`], [`DerivedEntry`] and field patches
//! - `meta` - [`MetaStore`], which owns structural edits and keeps the
//!   derived store's references valid
//! - `derived` - [`DerivedStore`]
//! - `reconcile` - the pure index-rewriting rules
//! - `file` - atomic whole-file writes
//!
//! # Example
//!
//! ```no_run
//! use clipforged_store::{MetaEntry, MetaStore};
//!
//! let store = MetaStore::open("/srv/data/set/dataset_meta.jsonl", "dataset.jsonl");
//! let position = store.append(MetaEntry::with_media_path("clips/a.mp4"))?;
//! let copy = store.insert_after(position, store.get(position)?.duplicate(position))?;
//! store.delete_at(copy)?;
//! # Ok::<(), clipforged_common::Error>(())
//! ```

pub mod codec;
pub mod derived;
pub mod file;
pub mod meta;
pub mod models;
pub mod reconcile;

pub use derived::DerivedStore;
pub use meta::MetaStore;
pub use models::{CaptureType, DerivedEntry, DownloadRange, EntryPatch, MetaEntry};
pub use reconcile::StructuralEdit;

/// Conventional file name of the derived store.
pub const DEFAULT_DERIVED_FILE: &str = "dataset.jsonl";
