//! Last known content per watched path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Shared map from path to the last text read from it.
///
/// Clones share the same map. The lock is only held for the map operation
/// itself, never across file reads or diffs.
#[derive(Debug, Clone, Default)]
pub struct ContentCache {
    entries: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl ContentCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last content seen for `path`, or an empty string if it was never set.
    pub fn get(&self, path: &Path) -> String {
        self.lock().get(path).cloned().unwrap_or_default()
    }

    /// Check whether `path` has an entry.
    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    /// Replace the content for `path`.
    pub fn set(&self, path: impl Into<PathBuf>, content: String) {
        self.lock().insert(path.into(), content);
    }

    /// Drop the entry for `path`, returning whether one existed.
    pub fn remove(&self, path: &Path) -> bool {
        let removed = self.lock().remove(path).is_some();
        if removed {
            debug!(path = %path.display(), "Dropped cached content");
        }
        removed
    }

    /// Number of cached paths.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, String>> {
        // Entries are plain strings; a panic mid-insert cannot leave one half-written.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_path_is_empty() {
        let cache = ContentCache::new();
        assert_eq!(cache.get(Path::new("/never/seen")), "");
        assert!(!cache.contains(Path::new("/never/seen")));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_replaces() {
        let cache = ContentCache::new();
        cache.set("/tmp/a.log", "first".to_string());
        cache.set("/tmp/a.log", "second".to_string());

        assert_eq!(cache.get(Path::new("/tmp/a.log")), "second");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_makes_path_new_again() {
        let cache = ContentCache::new();
        cache.set("/tmp/a.log", "content".to_string());

        assert!(cache.remove(Path::new("/tmp/a.log")));
        assert!(!cache.remove(Path::new("/tmp/a.log")));
        assert_eq!(cache.get(Path::new("/tmp/a.log")), "");
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = ContentCache::new();
        let other = cache.clone();
        other.set("/tmp/shared", "x".to_string());
        assert_eq!(cache.get(Path::new("/tmp/shared")), "x");
    }

    #[test]
    fn test_concurrent_access() {
        let cache = ContentCache::new();
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let path = PathBuf::from(format!("/tmp/{n}"));
                        cache.set(path.clone(), i.to_string());
                        let _ = cache.get(&path);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 8);
        assert_eq!(cache.get(Path::new("/tmp/3")), "99");
    }
}
