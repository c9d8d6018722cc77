//! Whole-file reads and atomic whole-file writes.
//!
//! Writes go to a temporary file in the target's directory which is then
//! renamed over the target, so a reader never observes a truncated store.

use clipforged_common::{Error, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Read a file, returning `None` if it does not exist.
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read a file that must exist.
pub fn read_required(path: &Path) -> Result<String> {
    read_optional(path)?.ok_or_else(|| Error::not_found(path.display()))
}

/// Replace the contents of `path` atomically.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::from(e.error))?;
    Ok(())
}

/// Put a file back the way it was before a failed paired write.
///
/// `previous == None` means the file did not exist.
pub fn restore(path: &Path, previous: Option<&str>) -> Result<()> {
    match previous {
        Some(text) => write_atomic(path, text),
        None => match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        },
    }
}

/// Write two files as one logical change.
///
/// If the second write fails, the first file is restored to `first_previous`
/// and the second write's error is returned.
pub fn write_pair(
    first: (&Path, &str, Option<&str>),
    second: (&Path, &str),
) -> Result<()> {
    let (first_path, first_new, first_previous) = first;
    let (second_path, second_new) = second;

    write_atomic(first_path, first_new)?;

    if let Err(e) = write_atomic(second_path, second_new) {
        tracing::warn!(
            "Write to {} failed, rolling back {}: {}",
            second_path.display(),
            first_path.display(),
            e
        );
        if let Err(restore_err) = restore(first_path, first_previous) {
            tracing::error!(
                "Rollback of {} failed: {}",
                first_path.display(),
                restore_err
            );
        }
        return Err(e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_optional_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_optional(&dir.path().join("nope")).unwrap(), None);
        assert!(matches!(
            read_required(&dir.path().join("nope")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.jsonl");
        write_atomic(&path, "one\n").unwrap();
        write_atomic(&path, "two\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two\n");

        // No stray temporaries left behind.
        let count = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 1);
    }

    #[test]
    fn write_atomic_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/store.jsonl");
        write_atomic(&path, "x\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "x\n");
    }

    #[test]
    fn write_pair_rolls_back_first_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("meta.jsonl");
        std::fs::write(&first, "old\n").unwrap();

        // A directory in place of the second file makes the rename fail.
        let second = dir.path().join("dataset.jsonl");
        std::fs::create_dir(&second).unwrap();
        std::fs::write(second.join("occupied"), "x").unwrap();

        let result = write_pair((&first, "new\n", Some("old\n")), (&second, "y\n"));
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "old\n");
    }

    #[test]
    fn restore_removes_file_that_did_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.jsonl");
        std::fs::write(&path, "x\n").unwrap();
        restore(&path, None).unwrap();
        assert!(!path.exists());
    }
}
