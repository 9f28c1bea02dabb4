//! Configuration types for change watching.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatcherError};

/// Files above this size are never read or diffed.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Default deadline for a single file read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// How a target is registered with the notification backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchMode {
    /// Exactly one file.
    SingleFile,

    /// Every directory of a tree, registered individually.
    Directory,
}

/// The file or directory tree a watcher observes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchTarget {
    /// Path of the file or root directory.
    pub path: PathBuf,

    /// Registration scope.
    pub mode: WatchMode,
}

impl WatchTarget {
    /// Watch a single file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: WatchMode::SingleFile,
        }
    }

    /// Watch a directory tree.
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: WatchMode::Directory,
        }
    }

    /// Build a target from the optional file and directory options.
    ///
    /// Exactly one of the two must be supplied.
    pub fn from_options(file: Option<PathBuf>, dir: Option<PathBuf>) -> Result<Self> {
        match (file, dir) {
            (Some(file), None) => Ok(Self::file(file)),
            (None, Some(dir)) => Ok(Self::directory(dir)),
            _ => Err(WatcherError::InvalidTarget),
        }
    }

    /// Path of the target.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check that the target exists and has the right type for its mode.
    pub fn validate(&self) -> Result<()> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WatcherError::TargetNotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        match self.mode {
            WatchMode::SingleFile if !metadata.is_file() => {
                Err(WatcherError::NotAFile(self.path.clone()))
            }
            WatchMode::Directory if !metadata.is_dir() => {
                Err(WatcherError::NotADirectory(self.path.clone()))
            }
            _ => Ok(()),
        }
    }
}

/// Tunables for a [`ChangeWatcher`](crate::ChangeWatcher).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Size cap for reads; larger files are skipped.
    pub max_file_bytes: u64,

    /// Deadline for a single read (None = wait forever).
    #[serde(with = "optional_secs")]
    pub read_timeout: Option<Duration>,

    /// Register directories created after startup (directory mode only).
    pub register_new_directories: bool,
}

impl WatcherConfig {
    /// Set the size cap.
    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    /// Set the read deadline.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Register directories created after startup.
    pub fn register_new_directories(mut self) -> Self {
        self.register_new_directories = true;
        self
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            register_new_directories: false,
        }
    }
}

/// `Option<Duration>` as whole seconds.
mod optional_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
