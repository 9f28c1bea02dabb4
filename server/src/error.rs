//! Error types for the server crate.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while answering a client request.
///
/// None of these close the connection; the transport turns them into an
/// `error` frame.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The frame was not a JSON object with a string `type`.
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The `type` field named no known request.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// The request carried a payload of the wrong shape.
    #[error("invalid data for {kind}: expected {expected}")]
    InvalidData {
        kind: &'static str,
        expected: &'static str,
    },

    /// Reading the requested file failed.
    #[error("failed to read file: {0}")]
    Read(#[from] tailscope_watcher::WatcherError),

    /// The reply could not be serialized.
    #[error("failed to encode reply: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Failure while handing a message to the hub.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HubError {
    /// The dispatcher task has exited.
    #[error("broadcast hub is closed")]
    Closed,

    /// The subscriber's queue is gone.
    #[error("subscriber {0} is no longer registered")]
    SubscriberGone(u64),
}

/// Failure while loading a [`ServerConfig`](crate::config::ServerConfig) file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
