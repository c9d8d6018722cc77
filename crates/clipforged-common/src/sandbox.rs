//! Confinement of request-supplied paths to a single root directory.
//!
//! [`PathSandbox`] is the only security boundary against path traversal.
//! Every component that touches the filesystem on behalf of a request asks
//! the sandbox for the absolute path first.
//!
//! Confinement is checked twice: lexically, then against the real path of
//! the deepest existing ancestor, so a symlink below the root cannot lead
//! out of it.

use crate::paths::normalize;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Resolves paths and rejects anything that lands outside `root`.
///
/// The root is injected at construction, so several sandboxes with
/// different roots can coexist (one per test, for instance).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSandbox {
    root: PathBuf,
}

impl PathSandbox {
    /// Create a sandbox rooted at `root`.
    ///
    /// A relative root is taken relative to the current working directory.
    /// The root does not need to exist yet.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(Error::validation("sandbox root cannot be empty"));
        }
        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };
        Ok(Self {
            root: normalize(&absolute),
        })
    }

    /// The normalized absolute root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether an absolute, normalized path is the root or below it.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// Resolve `path` to an absolute path inside the root.
    ///
    /// Relative paths are taken relative to the root itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutsideRoot`] if the resolved path is neither the root
    /// nor one of its descendants, and [`Error::Validation`] for an empty path.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::validation("path cannot be empty"));
        }
        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        self.confine(candidate)
    }

    /// Resolve `path` against the directory containing `base_file`.
    ///
    /// Absolute paths are used as given. The result passes the same
    /// confinement check as [`PathSandbox::resolve`].
    pub fn resolve_relative_to(
        &self,
        base_file: impl AsRef<Path>,
        path: impl AsRef<Path>,
    ) -> Result<PathBuf> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::validation("path cannot be empty"));
        }
        if path.is_absolute() {
            return self.confine(path.to_path_buf());
        }
        let base_dir = base_file
            .as_ref()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        let base_dir = if base_dir.is_absolute() {
            base_dir
        } else {
            self.root.join(base_dir)
        };
        self.confine(base_dir.join(path))
    }

    fn confine(&self, candidate: PathBuf) -> Result<PathBuf> {
        let resolved = normalize(&candidate);
        if !self.contains(&resolved) {
            return Err(Error::outside_root(resolved));
        }
        // A root that does not exist yet has nothing below it to follow.
        let Ok(real_root) = self.root.canonicalize() else {
            return Ok(resolved);
        };
        match real_path(&resolved) {
            Some(real) if real.starts_with(&real_root) => Ok(resolved),
            _ => {
                tracing::warn!(
                    "Rejected {}: follows a link out of {}",
                    resolved.display(),
                    self.root.display()
                );
                Err(Error::outside_root(resolved))
            }
        }
    }
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the
/// components that do not exist yet.
///
/// Returns `None` for a dangling symlink, whose target cannot be checked.
fn real_path(path: &Path) -> Option<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(real) => {
                return Some(missing.iter().rev().fold(real, |acc, part| acc.join(part)));
            }
            Err(_) => {
                if existing.symlink_metadata().is_ok() {
                    return None;
                }
                missing.push(existing.file_name()?.to_os_string());
                existing = existing.parent()?;
            }
        }
    }
}
