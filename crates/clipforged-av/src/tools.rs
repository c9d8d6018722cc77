//! Discovery of the external programs clipforged shells out to.

use clipforged_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// An external program clipforged depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaTool {
    /// Trims, crops, and extracts audio. Required for any trim.
    Ffmpeg,
    /// Fetches clips from video sites. Only needed for URL downloads.
    YtDlp,
}

impl MediaTool {
    pub const ALL: [MediaTool; 2] = [MediaTool::Ffmpeg, MediaTool::YtDlp];

    /// Executable name looked up on `PATH`.
    pub fn binary(self) -> &'static str {
        match self {
            MediaTool::Ffmpeg => "ffmpeg",
            MediaTool::YtDlp => "yt-dlp",
        }
    }

    /// ffmpeg predates the GNU `--version` convention.
    fn version_flag(self) -> &'static str {
        match self {
            MediaTool::Ffmpeg => "-version",
            MediaTool::YtDlp => "--version",
        }
    }

    /// What the tool is needed for, for diagnostics.
    pub fn purpose(self) -> &'static str {
        match self {
            MediaTool::Ffmpeg => "trimming and transcription",
            MediaTool::YtDlp => "URL downloads",
        }
    }

    /// Locate the tool: an existing configured path wins, then `PATH`.
    ///
    /// # Errors
    ///
    /// [`Error::Tool`] when neither yields an executable.
    pub fn locate(self, configured: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = configured {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            tracing::warn!(
                "Configured {} path {} does not exist, falling back to PATH",
                self.binary(),
                path.display()
            );
        }
        which::which(self.binary()).map_err(|_| Error::tool(self.binary(), "not found on PATH"))
    }

    /// Like [`MediaTool::locate`], but falls back to the bare name so a
    /// missing tool surfaces as a tool error on first use.
    pub fn locate_or_bare(self, configured: Option<&Path>) -> PathBuf {
        self.locate(configured).unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            PathBuf::from(self.binary())
        })
    }

    /// Run the tool's version command and report what was found.
    pub fn probe(self, configured: Option<&Path>) -> ToolStatus {
        let program = self.locate_or_bare(configured);
        let version = Command::new(&program)
            .arg(self.version_flag())
            .output()
            .ok()
            .filter(|out| out.status.success())
            .and_then(|out| {
                String::from_utf8_lossy(&out.stdout)
                    .lines()
                    .next()
                    .map(|line| line.trim().to_string())
            });

        ToolStatus {
            tool: self,
            path: version.as_ref().map(|_| program),
            version,
        }
    }
}

/// Result of [`MediaTool::probe`].
#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub tool: MediaTool,
    /// First line of the version output; `None` when the tool did not run.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

impl ToolStatus {
    pub fn available(&self) -> bool {
        self.version.is_some()
    }
}
