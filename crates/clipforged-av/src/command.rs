//! Running ffmpeg and yt-dlp as child processes under a watchdog.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use clipforged_common::{Error, Result};
use tokio::process::Command;

/// Re-encoding a long clip is slow.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// ffmpeg prints a banner and per-frame progress before the actual error;
/// only the tail is worth reporting.
const STDERR_TAIL_LINES: usize = 12;

/// Captured output of a successful run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Last non-blank stdout line. yt-dlp prints the final file path there.
    pub fn last_stdout_line(&self) -> Option<&str> {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty()).last()
    }
}

/// Argument-vector builder for one tool invocation.
///
/// ```no_run
/// use clipforged_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> clipforged_common::Result<()> {
/// ToolCommand::new(PathBuf::from("ffmpeg"))
///     .args(["-y", "-i", "/data/clip.mp4", "-vn", "/data/clip.mp3"])
///     .execute()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Short name used in error messages, e.g. `ffmpeg` for `/usr/bin/ffmpeg`.
    fn label(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Run to completion.
    ///
    /// # Errors
    ///
    /// - [`Error::ToolTimeout`] past the timeout; the child is killed.
    /// - [`Error::Tool`] on spawn failure or non-zero exit, carrying the
    ///   tail of stderr.
    pub async fn execute(&self) -> Result<ToolOutput> {
        let label = self.label();
        tracing::debug!("Running {} {}", label, self.args.join(" "));

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::tool(&label, format!("failed to spawn: {e}")))?;

        // Dropping the wait future on timeout kills the child.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::tool_timeout(&label, self.timeout))?
            .map_err(|e| Error::tool(&label, format!("failed waiting for process: {e}")))?;

        let output = ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !output.status.success() {
            return Err(Error::tool(
                label,
                format!("exited with {}: {}", output.status, stderr_tail(&output.stderr)),
            ));
        }
        Ok(output)
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    let skip = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[skip..].join("\n")
}
