//! Change watcher implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use walkdir::WalkDir;

use crate::backend::{BackendMessage, NotifyBackend, RawEvent, RawEventKind, WatchBackend};
use crate::cache::ContentCache;
use crate::config::{WatchMode, WatchTarget, WatcherConfig};
use crate::diff::compare_lines;
use crate::error::{Result, WatcherError};
use crate::event::{ChangeOperation, ChangeRecord, FileMetadata};

/// Lifecycle of a [`ChangeWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Created, not started.
    Idle,

    /// Registered and processing events.
    Watching,

    /// Shut down explicitly or because the notification stream ended.
    Closed,

    /// Startup failed; the watcher never reached `Watching`.
    Error,
}

/// Watches one target and reports every change through a callback.
///
/// Events for the target are handled one at a time, in the order the backend
/// delivers them. Failures while handling a single event are logged and the
/// event is dropped; only startup failures are returned to the caller.
pub struct ChangeWatcher<B: WatchBackend = NotifyBackend> {
    /// What is being watched.
    target: WatchTarget,

    /// Tunables.
    config: WatcherConfig,

    /// Last seen content per path.
    cache: ContentCache,

    /// Backend, until it moves into the event loop.
    backend: Option<B>,

    /// Current lifecycle state.
    state: Arc<RwLock<WatchState>>,

    /// Event loop task.
    task: Option<JoinHandle<()>>,
}

impl ChangeWatcher<NotifyBackend> {
    /// Create a watcher backed by the OS notification mechanism.
    pub fn with_notify(target: WatchTarget) -> Result<Self> {
        Ok(Self::new(target, NotifyBackend::new()?))
    }
}

impl<B: WatchBackend> ChangeWatcher<B> {
    /// Create an idle watcher.
    pub fn new(target: WatchTarget, backend: B) -> Self {
        Self {
            target,
            config: WatcherConfig::default(),
            cache: ContentCache::new(),
            backend: Some(backend),
            state: Arc::new(RwLock::new(WatchState::Idle)),
            task: None,
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: WatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// The watch target.
    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    /// The content cache shared with the event loop.
    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WatchState {
        *self.state.read().await
    }

    /// Register the target and start the event loop.
    ///
    /// In single-file mode the file is read once before registration so the
    /// first write is diffed against its real prior content. In directory mode
    /// every directory of the tree is registered.
    pub async fn start<F>(&mut self, on_change: F) -> Result<()>
    where
        F: Fn(ChangeRecord) + Send + Sync + 'static,
    {
        if *self.state.read().await != WatchState::Idle {
            return Err(WatcherError::AlreadyStarted);
        }
        let Some(mut backend) = self.backend.take() else {
            return Err(WatcherError::AlreadyStarted);
        };

        let events = match self.prepare(&mut backend).await {
            Ok(events) => events,
            Err(e) => {
                error!(path = %self.target.path.display(), "Failed to start watcher: {e}");
                *self.state.write().await = WatchState::Error;
                return Err(e);
            }
        };

        let processor = EventProcessor {
            mode: self.target.mode,
            config: self.config.clone(),
            cache: self.cache.clone(),
            on_change,
        };

        *self.state.write().await = WatchState::Watching;
        info!(
            path = %self.target.path.display(),
            mode = ?self.target.mode,
            "Watcher started"
        );

        let state = self.state.clone();
        self.task = Some(tokio::spawn(async move {
            processor.run(backend, events).await;
            let mut state = state.write().await;
            if *state == WatchState::Watching {
                *state = WatchState::Closed;
            }
        }));

        Ok(())
    }

    /// Stop the event loop and release the backend.
    pub async fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }

        let mut state = self.state.write().await;
        if *state != WatchState::Error {
            *state = WatchState::Closed;
        }
        info!(path = %self.target.path.display(), "Watcher closed");
    }

    async fn prepare(&self, backend: &mut B) -> Result<mpsc::UnboundedReceiver<BackendMessage>> {
        self.target.validate()?;
        let path = self.target.path();

        match self.target.mode {
            WatchMode::SingleFile => {
                let (content, _) = read_file_content(path, &self.config).await?;
                self.cache.set(path, content);
                backend.register(path)?;
                debug!("Watching file: {}", path.display());
            }
            WatchMode::Directory => {
                let count = register_directories(backend, path)?;
                info!("Registered {count} directories under {}", path.display());
            }
        }

        backend.events().ok_or(WatcherError::EventsUnavailable)
    }
}

impl<B: WatchBackend> Drop for ChangeWatcher<B> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Event loop state, owned by the spawned task.
struct EventProcessor<F> {
    mode: WatchMode,
    config: WatcherConfig,
    cache: ContentCache,
    on_change: F,
}

impl<F> EventProcessor<F>
where
    F: Fn(ChangeRecord) + Send + Sync + 'static,
{
    async fn run<B: WatchBackend>(
        self,
        mut backend: B,
        mut events: mpsc::UnboundedReceiver<BackendMessage>,
    ) {
        while let Some(message) = events.recv().await {
            match message {
                Ok(event) => self.handle_event(&mut backend, event).await,
                Err(e) => warn!("Watch error: {e}"),
            }
        }

        info!("Notification stream closed, watch loop exiting");
    }

    async fn handle_event<B: WatchBackend>(&self, backend: &mut B, event: RawEvent) {
        trace!(kind = ?event.kind, paths = ?event.paths, "Handling event");

        match (event.kind, self.mode) {
            (RawEventKind::Write, _) => {
                for path in event.paths {
                    self.handle_write(path).await;
                }
            }
            (RawEventKind::Other, _) => {}
            (kind, WatchMode::Directory) => {
                for path in event.paths {
                    self.handle_structural(backend, kind, path);
                }
            }
            (kind, WatchMode::SingleFile) => {
                debug!(?kind, "Ignoring non-write event in single-file mode");
            }
        }
    }

    /// Read, diff against the cache, update the cache and report.
    async fn handle_write(&self, path: PathBuf) {
        if tokio::fs::metadata(&path)
            .await
            .is_ok_and(|metadata| metadata.is_dir())
        {
            return;
        }

        let (content, metadata) = match read_file_content(&path, &self.config).await {
            Ok(read) => read,
            Err(e @ WatcherError::FileTooLarge { .. }) => {
                error!(path = %path.display(), "Skipping change: {e}");
                return;
            }
            Err(e) => {
                warn!(path = %path.display(), "Failed to read changed file: {e}");
                return;
            }
        };

        let previous = self.cache.get(&path);
        let diffed = tokio::task::spawn_blocking(move || {
            let line_changes = compare_lines(&previous, &content);
            (previous, content, line_changes)
        })
        .await;
        let (previous, content, line_changes) = match diffed {
            Ok(diffed) => diffed,
            Err(e) => {
                error!(path = %path.display(), "Diff task failed: {e}");
                return;
            }
        };

        self.cache.set(path.clone(), content.clone());

        let record = ChangeRecord::modified(path, previous, content, line_changes, metadata);
        debug!(
            path = %record.path.display(),
            added = record.lines_added(),
            removed = record.lines_removed(),
            "File modified"
        );
        (self.on_change)(record);
    }

    /// Report create/remove/rename without reading content.
    fn handle_structural<B: WatchBackend>(
        &self,
        backend: &mut B,
        kind: RawEventKind,
        path: PathBuf,
    ) {
        let op = match kind {
            RawEventKind::Create => ChangeOperation::Created,
            RawEventKind::Remove => ChangeOperation::Removed,
            RawEventKind::Rename => ChangeOperation::Renamed,
            RawEventKind::Write | RawEventKind::Other => return,
        };

        let metadata = match op {
            ChangeOperation::Created => FileMetadata::from_path(&path),
            _ => {
                self.cache.remove(&path);
                None
            }
        };

        if op == ChangeOperation::Created
            && self.config.register_new_directories
            && path.is_dir()
        {
            match register_directories(backend, &path) {
                Ok(count) => {
                    info!("Registered {count} new directories under {}", path.display());
                }
                Err(e) => {
                    warn!(path = %path.display(), "Failed to register new directory: {e}");
                }
            }
        }

        debug!(path = %path.display(), %op, "Structural change");
        (self.on_change)(ChangeRecord::structural(path, op).with_metadata(metadata));
    }
}

/// Register `root` and every directory beneath it, returning how many were
/// registered.
fn register_directories<B: WatchBackend>(backend: &mut B, root: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            backend.register(entry.path())?;
            debug!("Watching directory: {}", entry.path().display());
            count += 1;
        }
    }
    Ok(count)
}

/// Read a file as text, honoring the size cap and read deadline.
///
/// Invalid UTF-8 is replaced rather than rejected.
pub async fn read_file_content(
    path: &Path,
    config: &WatcherConfig,
) -> Result<(String, FileMetadata)> {
    let read = read_capped(path, config.max_file_bytes);
    match config.read_timeout {
        Some(timeout) => tokio::time::timeout(timeout, read)
            .await
            .map_err(|_| WatcherError::ReadTimeout {
                path: path.to_path_buf(),
                timeout,
            })?,
        None => read.await,
    }
}

async fn read_capped(path: &Path, limit: u64) -> Result<(String, FileMetadata)> {
    let file = tokio::fs::File::open(path).await?;
    let metadata = file.metadata().await?;
    let too_large = |size| WatcherError::FileTooLarge {
        path: path.to_path_buf(),
        size,
        limit,
    };

    if metadata.len() > limit {
        return Err(too_large(metadata.len()));
    }

    // The file may grow between the stat and the read.
    let mut bytes = Vec::with_capacity(metadata.len() as usize);
    file.take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .await?;
    if bytes.len() as u64 > limit {
        return Err(too_large(bytes.len() as u64));
    }

    Ok((
        String::from_utf8_lossy(&bytes).into_owned(),
        FileMetadata::from(&metadata),
    ))
}
