//! Error types for the change watcher.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that can occur in the change watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Watch target does not exist.
    #[error("watch target not found: {0}")]
    TargetNotFound(PathBuf),

    /// Single-file mode was given something other than a regular file.
    #[error("not a file: {0}")]
    NotAFile(PathBuf),

    /// Directory mode was given something other than a directory.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Neither or both of the file and directory targets were supplied.
    #[error("exactly one of a file or a directory must be watched")]
    InvalidTarget,

    /// File exceeds the configured size cap.
    #[error("file too large: {path} is {size} bytes (limit {limit})")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    /// Reading a file did not finish before the deadline.
    #[error("read of {path} timed out after {timeout:?}")]
    ReadTimeout { path: PathBuf, timeout: Duration },

    /// `start` was called on a watcher that already left the idle state.
    #[error("watcher already started")]
    AlreadyStarted,

    /// The backend event stream was already taken.
    #[error("backend event stream unavailable")]
    EventsUnavailable,

    /// Notify error.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// Directory walk error.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
