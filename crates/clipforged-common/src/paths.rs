//! Path utilities: lexical normalization, relative paths, and content types.
//!
//! Everything here is purely lexical; nothing touches the filesystem.

use std::path::{Component, Path, PathBuf};

/// Extension to MIME type mapping for media served to the browser.
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("m4a", "audio/mp4"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
];

/// Fallback for unknown extensions.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Collapse `.` and `..` components without consulting the filesystem.
///
/// `..` at the root stays at the root, matching how a shell resolves
/// `/../etc`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use clipforged_common::paths::normalize;
///
/// assert_eq!(normalize(Path::new("/a/b/../c/./d")), Path::new("/a/c/d"));
/// assert_eq!(normalize(Path::new("/../etc")), Path::new("/etc"));
/// ```
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Express `target` relative to the directory `base`.
///
/// Both paths are expected to be absolute and normalized. Returns `.` when
/// they are equal.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use clipforged_common::paths::relative_to;
///
/// assert_eq!(
///     relative_to(Path::new("/data/set"), Path::new("/data/set/out/a.mp3")),
///     Path::new("out/a.mp3")
/// );
/// assert_eq!(
///     relative_to(Path::new("/data/set"), Path::new("/data/other/a.mp3")),
///     Path::new("../other/a.mp3")
/// );
/// ```
pub fn relative_to(base: &Path, target: &Path) -> PathBuf {
    let base: Vec<Component<'_>> = base.components().collect();
    let target: Vec<Component<'_>> = target.components().collect();

    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base.len() {
        out.push("..");
    }
    for component in &target[common..] {
        out.push(component.as_os_str());
    }

    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

/// Choose a content type from the file extension (case-insensitive).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use clipforged_common::paths::content_type_for;
///
/// assert_eq!(content_type_for(Path::new("clip.MP4")), "video/mp4");
/// assert_eq!(content_type_for(Path::new("notes.txt")), "application/octet-stream");
/// ```
pub fn content_type_for(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return OCTET_STREAM;
    };
    let ext = ext.to_lowercase();
    CONTENT_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(OCTET_STREAM)
}

/// File name without its extension, as UTF-8.
pub fn file_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}
