//! Shared state handed to every connection.

use tailscope_watcher::{WatchTarget, WatcherConfig};

use crate::hub::BroadcastHub;

/// What a request handler may touch.
///
/// Built once at startup and shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AppContext {
    /// Fan-out for change messages.
    pub hub: BroadcastHub,

    /// The file or directory being watched.
    pub target: WatchTarget,

    /// Read limits also applied to `get_file_content`.
    pub watcher_config: WatcherConfig,
}

impl AppContext {
    pub fn new(hub: BroadcastHub, target: WatchTarget, watcher_config: WatcherConfig) -> Self {
        Self {
            hub,
            target,
            watcher_config,
        }
    }
}
