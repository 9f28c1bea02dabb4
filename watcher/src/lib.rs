//! # Change Watcher
//!
//! This crate watches a single file or a directory tree and turns every
//! content write into a line-level diff against the previously seen content.
//!
//! ## Features
//!
//! - **Two modes**: one file, or every directory of a tree
//! - **Line diffs**: LCS-based added/removed lines per write
//! - **Content cache**: last seen text per path, shared between tasks
//! - **Pluggable backend**: OS notifications via `notify`, or a fake in tests
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Change Watcher                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  WatchBackend ──► ChangeWatcher ──► ChangeRecord ──► callback   │
//! │                        │    ▲                                   │
//! │                        ▼    │                                   │
//! │                 ContentCache  compare_lines                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod diff;
pub mod error;
pub mod event;
pub mod watcher;

pub use backend::{BackendMessage, NotifyBackend, RawEvent, RawEventKind, WatchBackend};
pub use cache::ContentCache;
pub use config::{DEFAULT_MAX_FILE_BYTES, WatchMode, WatchTarget, WatcherConfig};
pub use diff::compare_lines;
pub use error::{Result, WatcherError};
pub use event::{ChangeOperation, ChangeRecord, FileMetadata, LineChange, LineChangeKind};
pub use watcher::{ChangeWatcher, WatchState, read_file_content};
