//! WebSocket front end for the change watcher.
//!
//! Change records from [`tailscope_watcher`] are encoded as `log` messages and
//! fanned out through a [`BroadcastHub`] to every connected client. Clients may
//! also query the server over the same socket; see [`protocol`].

pub mod config;
pub mod context;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod transport;

pub use config::{DEFAULT_BIND_ADDR, ServerConfig};
pub use context::AppContext;
pub use error::{ConfigError, HubError, ProtocolError};
pub use hub::{
    BroadcastHub, DEFAULT_QUEUE_CAPACITY, HubStats, ReplySender, Subscriber, SubscriberId,
};
pub use transport::{router, serve};

use tailscope_watcher::{ChangeRecord, ChangeWatcher, WatchBackend, WatcherError};
use tracing::{error, warn};

/// Callback that publishes each change record to `hub`.
///
/// Encoding failures are logged and the record is dropped.
pub fn publish_changes(hub: BroadcastHub) -> impl Fn(ChangeRecord) + Send + Sync + 'static {
    move |record| {
        let message = match protocol::encode_change(&record) {
            Ok(message) => message,
            Err(e) => {
                error!(path = %record.path.display(), "Failed to encode change: {e}");
                return;
            }
        };
        if let Err(e) = hub.publish(message) {
            warn!(path = %record.path.display(), "Dropped change: {e}");
        }
    }
}

/// Start `watcher` with its changes flowing into `hub`.
pub async fn start_watcher<B: WatchBackend>(
    watcher: &mut ChangeWatcher<B>,
    hub: &BroadcastHub,
) -> Result<(), WatcherError> {
    watcher.start(publish_changes(hub.clone())).await
}
