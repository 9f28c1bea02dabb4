//! Notification backends.
//!
//! The watcher only needs two capabilities from the OS layer: register a path
//! and hand over a stream of raw events. [`WatchBackend`] captures that, so the
//! event loop can be driven by [`NotifyBackend`] in production and by an
//! in-memory fake in tests.

use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Result, WatcherError};

/// Message on a backend event stream.
pub type BackendMessage = std::result::Result<RawEvent, notify::Error>;

/// Source of raw filesystem notifications.
pub trait WatchBackend: Send + 'static {
    /// Start receiving notifications for `path` itself (non-recursive).
    fn register(&mut self, path: &Path) -> Result<()>;

    /// Take the event stream. Only the first call returns `Some`.
    ///
    /// The stream ends when the backend shuts down.
    fn events(&mut self) -> Option<mpsc::UnboundedReceiver<BackendMessage>>;
}

/// Backend-neutral event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    /// File content was written.
    Write,

    /// Path was created.
    Create,

    /// Path was removed.
    Remove,

    /// Path was renamed away (the old name).
    Rename,

    /// Anything else (access, metadata).
    Other,
}

impl From<EventKind> for RawEventKind {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Create(_) => Self::Create,
            EventKind::Remove(_) => Self::Remove,
            // A rename arrives as `From` (old path), `To` (new path) and a
            // combined `Both` carrying both paths; `Both` would repeat them.
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Self::Create,
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => Self::Other,
            EventKind::Modify(ModifyKind::Name(_)) => Self::Rename,
            EventKind::Modify(ModifyKind::Metadata(_)) => Self::Other,
            EventKind::Modify(_) => Self::Write,
            _ => Self::Other,
        }
    }
}

/// A notification before any filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: RawEventKind,
    pub paths: Vec<PathBuf>,
}

impl RawEvent {
    /// Create an event for a single path.
    pub fn new(kind: RawEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            paths: vec![path.into()],
        }
    }
}

impl From<notify::Event> for RawEvent {
    fn from(event: notify::Event) -> Self {
        Self {
            kind: event.kind.into(),
            paths: event.paths,
        }
    }
}

/// Backend on top of the platform's recommended `notify` watcher.
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
    events: Option<mpsc::UnboundedReceiver<BackendMessage>>,
}

impl NotifyBackend {
    /// Create the OS watcher.
    pub fn new() -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| {
                if let Ok(event) = &res {
                    trace!(kind = ?event.kind, paths = ?event.paths, "Received notify event");
                }
                // Receiver gone means the watch loop has exited.
                let _ = event_tx.send(res.map(RawEvent::from));
            },
        )?;

        Ok(Self {
            watcher,
            events: Some(event_rx),
        })
    }
}

impl WatchBackend for NotifyBackend {
    fn register(&mut self, path: &Path) -> Result<()> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(WatcherError::from)
    }

    fn events(&mut self) -> Option<mpsc::UnboundedReceiver<BackendMessage>> {
        self.events.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            RawEventKind::from(EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            RawEventKind::Write
        );
        assert_eq!(
            RawEventKind::from(EventKind::Modify(ModifyKind::Any)),
            RawEventKind::Write
        );
        assert_eq!(
            RawEventKind::from(EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            RawEventKind::Rename
        );
        assert_eq!(
            RawEventKind::from(EventKind::Modify(ModifyKind::Name(RenameMode::Any))),
            RawEventKind::Rename
        );
        assert_eq!(
            RawEventKind::from(EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            RawEventKind::Create
        );
        assert_eq!(
            RawEventKind::from(EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            RawEventKind::Other
        );
        assert_eq!(
            RawEventKind::from(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))),
            RawEventKind::Other
        );
        assert_eq!(
            RawEventKind::from(EventKind::Create(CreateKind::File)),
            RawEventKind::Create
        );
        assert_eq!(
            RawEventKind::from(EventKind::Remove(RemoveKind::File)),
            RawEventKind::Remove
        );
    }

    #[test]
    fn test_events_taken_once() {
        let mut backend = NotifyBackend::new().unwrap();
        assert!(backend.events().is_some());
        assert!(backend.events().is_none());
    }
}
