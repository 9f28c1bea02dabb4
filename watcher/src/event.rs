//! Change records produced by the watcher.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed filesystem event.
///
/// Only `path`, `op` and `line_changes` are serialized; the full texts and
/// metadata stay in-process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Path of the affected file.
    pub path: PathBuf,

    /// What happened to it.
    pub op: ChangeOperation,

    /// Text after the event (`modified` only).
    #[serde(skip)]
    pub content: String,

    /// Text before the event (`modified` only).
    #[serde(skip)]
    pub previous_content: String,

    /// Line-level diff from `previous_content` to `content`.
    #[serde(default)]
    pub line_changes: Vec<LineChange>,

    /// Size and mtime captured at read time, if the file could be stat'ed.
    #[serde(skip)]
    pub metadata: Option<FileMetadata>,
}

impl ChangeRecord {
    /// A content change with its diff.
    pub fn modified(
        path: impl Into<PathBuf>,
        previous_content: String,
        content: String,
        line_changes: Vec<LineChange>,
        metadata: FileMetadata,
    ) -> Self {
        Self {
            path: path.into(),
            op: ChangeOperation::Modified,
            content,
            previous_content,
            line_changes,
            metadata: Some(metadata),
        }
    }

    /// A structural event reported without reading content.
    pub fn structural(path: impl Into<PathBuf>, op: ChangeOperation) -> Self {
        Self {
            path: path.into(),
            op,
            content: String::new(),
            previous_content: String::new(),
            line_changes: Vec::new(),
            metadata: None,
        }
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: Option<FileMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Number of added lines.
    pub fn lines_added(&self) -> usize {
        self.line_changes
            .iter()
            .filter(|c| c.kind == LineChangeKind::Added)
            .count()
    }

    /// Number of removed lines.
    pub fn lines_removed(&self) -> usize {
        self.line_changes
            .iter()
            .filter(|c| c.kind == LineChangeKind::Removed)
            .count()
    }
}

/// Kind of filesystem event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    /// File was created.
    Created,

    /// File content was written.
    Modified,

    /// File was removed.
    Removed,

    /// File was renamed or moved.
    Renamed,
}

impl ChangeOperation {
    /// Wire name of the operation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
            Self::Renamed => "renamed",
        }
    }
}

impl std::fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One added or removed line.
///
/// A changed line is a `Removed` entry followed by an `Added` entry. Line
/// numbers are 1-based; the side that does not apply is `0` with empty text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineChange {
    #[serde(rename = "type")]
    pub kind: LineChangeKind,

    pub old_line: usize,

    pub new_line: usize,

    pub old_text: String,

    pub new_text: String,
}

impl LineChange {
    /// A line present only in the new text.
    pub fn added(new_line: usize, new_text: impl Into<String>) -> Self {
        Self {
            kind: LineChangeKind::Added,
            old_line: 0,
            new_line,
            old_text: String::new(),
            new_text: new_text.into(),
        }
    }

    /// A line present only in the old text.
    pub fn removed(old_line: usize, old_text: impl Into<String>) -> Self {
        Self {
            kind: LineChangeKind::Removed,
            old_line,
            new_line: 0,
            old_text: old_text.into(),
            new_text: String::new(),
        }
    }
}

/// Direction of a line change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineChangeKind {
    Added,
    Removed,
}

/// File attributes captured when a file is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// File size in bytes.
    pub size: u64,

    /// Last modification time, if the platform reports one.
    pub modified: Option<DateTime<Utc>>,
}

impl FileMetadata {
    /// Stat a path, returning `None` if it cannot be stat'ed.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.metadata().ok().map(|m| Self::from(&m))
    }
}

impl From<&std::fs::Metadata> for FileMetadata {
    fn from(metadata: &std::fs::Metadata) -> Self {
        Self {
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_record_wire_shape() {
        let record = ChangeRecord::modified(
            "/var/log/app.log",
            "a\nb".to_string(),
            "a\nx".to_string(),
            vec![LineChange::removed(2, "b"), LineChange::added(2, "x")],
            FileMetadata {
                size: 3,
                modified: None,
            },
        );

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "path": "/var/log/app.log",
                "op": "modified",
                "line_changes": [
                    {"type": "removed", "old_line": 2, "new_line": 0, "old_text": "b", "new_text": ""},
                    {"type": "added", "old_line": 0, "new_line": 2, "old_text": "", "new_text": "x"},
                ],
            })
        );
    }

    #[test]
    fn test_structural_record_has_no_content() {
        let record = ChangeRecord::structural("/tmp/gone.txt", ChangeOperation::Removed);
        assert!(record.content.is_empty());
        assert!(record.line_changes.is_empty());
        assert!(record.metadata.is_none());
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"path": "/tmp/gone.txt", "op": "removed", "line_changes": []})
        );
    }

    #[test]
    fn test_line_counts() {
        let mut record = ChangeRecord::structural("f", ChangeOperation::Modified);
        record.line_changes = vec![
            LineChange::removed(1, "a"),
            LineChange::added(1, "b"),
            LineChange::added(2, "c"),
        ];
        assert_eq!(record.lines_added(), 2);
        assert_eq!(record.lines_removed(), 1);
    }
}
