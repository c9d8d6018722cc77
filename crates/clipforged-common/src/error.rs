//! Unified error type for clipforged.
//!
//! Store, sandbox, and tool failures all funnel into [`Error`], which carries
//! enough context for API handlers to derive an HTTP status code via
//! [`Error::http_status`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Unified error type covering all failure modes in clipforged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A path escaped the sandbox root. Never retried.
    #[error("Path outside allowed root: {}", path.display())]
    OutsideRoot {
        /// The offending path after resolution.
        path: PathBuf,
    },

    /// A positional index no longer addresses a live entry.
    #[error("Index out of range: {index} (store has {len} entries)")]
    IndexOutOfRange {
        /// The requested position.
        index: usize,
        /// Number of entries in the store at the time of the request.
        len: usize,
    },

    /// A store file contains a line that is not a valid record.
    #[error("Malformed record on line {line}: {message}")]
    MalformedRecord {
        /// One-based line number in the store file.
        line: usize,
        /// Parser diagnostic.
        message: String,
    },

    /// A `Range` header could not be satisfied.
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// An external tool or service returned a failure.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool or service that failed.
        tool: String,
        /// Diagnostic output from the tool.
        message: String,
    },

    /// An external tool or service did not finish in time.
    #[error("Tool error [{tool}]: timed out after {after:?}")]
    ToolTimeout {
        /// Name of the tool or service.
        tool: String,
        /// How long we waited.
        after: Duration,
    },

    /// A required field was absent on a record or request.
    #[error("Missing field: {0}")]
    MissingField(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A file or entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::OutsideRoot { .. } => 403,
            Error::IndexOutOfRange { .. } => 404,
            Error::MalformedRecord { .. } => 422,
            Error::InvalidRange(_) => 416,
            Error::Tool { .. } => 422,
            Error::ToolTimeout { .. } => 422,
            Error::MissingField(_) => 400,
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Error::OutsideRoot { .. } => "outside_root",
            Error::IndexOutOfRange { .. } => "index_out_of_range",
            Error::MalformedRecord { .. } => "malformed_record",
            Error::InvalidRange(_) => "invalid_range",
            Error::Tool { .. } => "tool_failure",
            Error::ToolTimeout { .. } => "tool_timeout",
            Error::MissingField(_) => "missing_field",
            Error::Validation(_) => "validation_error",
            Error::NotFound(_) => "not_found",
            Error::Io { .. } => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// True for both tool failure kinds.
    pub fn is_tool_failure(&self) -> bool {
        matches!(self, Error::Tool { .. } | Error::ToolTimeout { .. })
    }

    /// Convenience constructor for [`Error::OutsideRoot`].
    pub fn outside_root(path: impl Into<PathBuf>) -> Self {
        Error::OutsideRoot { path: path.into() }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::ToolTimeout`].
    pub fn tool_timeout(tool: impl Into<String>, after: Duration) -> Self {
        Error::ToolTimeout {
            tool: tool.into(),
            after,
        }
    }

    /// Convenience constructor for [`Error::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(what: impl fmt::Display) -> Self {
        Error::NotFound(what.to_string())
    }

    /// Convenience constructor for [`Error::MissingField`].
    pub fn missing_field(field: impl Into<String>) -> Self {
        Error::MissingField(field.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outside_root_display() {
        let err = Error::outside_root("/etc/passwd");
        assert_eq!(err.to_string(), "Path outside allowed root: /etc/passwd");
        assert_eq!(err.http_status(), 403);
        assert_eq!(err.code(), "outside_root");
    }

    #[test]
    fn index_out_of_range_display() {
        let err = Error::IndexOutOfRange { index: 7, len: 3 };
        assert_eq!(err.to_string(), "Index out of range: 7 (store has 3 entries)");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn invalid_range_is_416() {
        assert_eq!(Error::InvalidRange("bytes=x".into()).http_status(), 416);
    }

    #[test]
    fn tool_failures_are_client_visible() {
        let failed = Error::tool("ffmpeg", "No such file");
        let timed_out = Error::tool_timeout("replicate", Duration::from_secs(5));
        assert!(failed.is_tool_failure());
        assert!(timed_out.is_tool_failure());
        assert_ne!(failed.code(), timed_out.code());
        assert!((400..500).contains(&failed.http_status()));
        assert!(timed_out.to_string().contains("timed out"));
    }

    #[test]
    fn io_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn malformed_record_names_line() {
        let err = Error::MalformedRecord {
            line: 4,
            message: "expected value".into(),
        };
        assert!(err.to_string().contains("line 4"));
        assert_eq!(err.code(), "malformed_record");
    }
}
